pub mod bounded;
pub mod expense;
pub mod group;
pub mod history;
pub mod membership;
pub mod notification;
pub mod recurring;
pub mod settlement;
pub mod user;

pub use bounded::*;
pub use expense::*;
pub use group::*;
pub use history::*;
pub use membership::*;
pub use notification::*;
pub use recurring::*;
pub use settlement::*;
pub use user::*;
