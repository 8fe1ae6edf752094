pub mod checkpoint;
pub mod codec;
pub mod key;
pub mod value_box;

pub use checkpoint::CheckpointValueBox;
pub use key::ValueBoxKey;
pub use value_box::{MemoryValueBox, ValueBox, ValueBoxTable};
