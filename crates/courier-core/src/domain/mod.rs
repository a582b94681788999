//! Domain - タスクとその状態
//!
//! - **task**: `Task` / `TaskId`（投入される値、不変）
//! - **state**: `TaskState`（queued / running / done / failed）
//! - **meta**: `TaskMeta`（store が所有する可変メタデータ）

pub mod meta;
pub mod state;
pub mod task;

pub use self::meta::TaskMeta;
pub use self::state::TaskState;
pub use self::task::{Task, TaskId};
