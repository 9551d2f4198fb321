pub mod models;
pub mod manager;
pub mod finance;
pub mod coupons;

pub use models::{
    Invoice, InvoiceLine, InvoiceStatus, OrderStatus, Payment, PaymentMethod, SaleOrder,
    SaleOrderLine,
};
pub use manager::{OrderAction, OrderError, OrderManager, ReservationEffect};
pub use finance::{EarningsSummary, FinancialManager, InvoiceRates, LateFeePolicy};
pub use coupons::{Coupon, CouponError, DiscountKind};
