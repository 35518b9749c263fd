//! Scrollink Core Library
//!
//! Stroke capture, rendering pipeline and collaborative merge engine for an
//! ink canvas that scrolls upward forever.

pub mod cache;
pub mod capture;
pub mod clock;
pub mod collaboration;
pub mod config;
pub mod crdt;
pub mod engine;
pub mod events;
pub mod frame;
pub mod freehand;
pub mod input;
pub mod paint;
pub mod scroll;
pub mod session;
pub mod storage;
pub mod stroke;
pub mod style;
pub mod sync;
pub mod viewport;

pub use capture::{CaptureState, StrokeCapture};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaboration::{CollaborationManager, LinkState};
pub use config::{ConfigError, EngineConfig, PersistConfig, ScrollAnchor, ScrollinkConfig, SyncConfig};
pub use crdt::{CrdtError, StrokeDocument};
pub use engine::{InkEngine, Origin};
pub use events::{EngineEvent, EventBus};
pub use frame::{FrameHandle, FrameScheduler, ManualFrames};
pub use input::{PointerEvent, PointerKind, PointerSample};
pub use paint::{Bitmap, Composite, PaintTarget, StrokePainter, Surface};
pub use scroll::ScrollModel;
pub use session::InkSession;
pub use storage::{FileStore, FlushQueue, MemoryStore, StorageError, StrokeRow, StrokeStore};
pub use stroke::{Privilege, Stroke, StrokeColor, StrokeId, StrokePoint, Tool};
pub use style::StyleControls;
pub use sync::{ConnectionState, NativeWebSocket, SyncError, SyncEvent, SyncTransport};
pub use viewport::Viewport;
