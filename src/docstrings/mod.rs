pub mod async_detection;
pub mod block;
pub mod builtin;
pub mod cancellation;
pub mod detector;
pub mod pattern;
pub mod pattern_registry;
pub mod preview;
pub mod service;

pub use async_detection::{DetectionRequest, DetectionResult, DetectionWorkerHandle, spawn_detection_worker};
pub use block::DocumentationBlock;
pub use cancellation::CancellationToken;
pub use detector::{Detection, DocstringDetector};
pub use pattern::{DetectionPattern, Matcher, PatternError, PatternSpec, SyntaxFamily};
pub use pattern_registry::PatternRegistry;
pub use preview::{DEFAULT_MAX_PREVIEW_LENGTH, PreviewExtractor, extract_preview, strip_content, truncate_preview};
pub use service::{DocstringService, DocumentSnapshot};
