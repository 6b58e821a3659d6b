mod account;
mod invoice;
mod money;
mod party;
mod product;
mod work_order;

pub use account::*;
pub use invoice::*;
pub use money::*;
pub use party::*;
pub use product::*;
pub use work_order::*;
