pub mod slots;

pub use slots::{SlotGuard, SlotManager};
