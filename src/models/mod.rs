pub mod debug_mode;
pub mod fill;
pub mod offer;
pub mod order;
pub mod recipe;
pub mod team;

pub use debug_mode::DebugMode;
pub use fill::Fill;
pub use offer::{Offer, OfferStatus};
pub use order::{Order, OrderMode, OrderSide, OrderStatus};
pub use recipe::{Recipe, RecipeType, Role};
pub use team::Team;
