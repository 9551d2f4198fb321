pub mod period;
pub mod product;
pub mod pricing;
pub mod inventory;

pub use period::PeriodUnit;
pub use product::{Product, ProductError, ProductVariant, PricingTier};
pub use pricing::{PricingEngine, PricingError, RentalQuote};
pub use inventory::{
    available_in_window, reserved_in_window, DateWindow, InventoryError, InventoryManager,
    Reservation, ReservationRequest,
};
