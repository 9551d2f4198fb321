use rental_catalog::Product;
use rental_order::{Invoice, OrderStatus, SaleOrder};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::identity::User;

/// Platform-wide figures for the admin dashboard
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlatformSummary {
    pub users_by_role: BTreeMap<String, usize>,
    pub active_users: usize,
    pub products: usize,
    pub published_products: usize,
    pub orders_by_status: BTreeMap<String, usize>,
    pub active_rentals: usize,
    pub invoiced_cents: i64,
    pub collected_cents: i64,
    pub outstanding_cents: i64,
    pub platform_fees_cents: i64,
    pub late_fees_cents: i64,
}

pub fn build_summary(
    users: &[User],
    products: &[Product],
    orders: &[SaleOrder],
    invoices: &[Invoice],
) -> PlatformSummary {
    let mut summary = PlatformSummary {
        active_users: users.iter().filter(|u| u.is_active).count(),
        products: products.len(),
        published_products: products.iter().filter(|p| p.is_published).count(),
        ..Default::default()
    };

    for user in users {
        *summary
            .users_by_role
            .entry(user.role.as_str().to_string())
            .or_default() += 1;
    }

    for order in orders {
        *summary
            .orders_by_status
            .entry(order.status.as_str().to_string())
            .or_default() += 1;
        if order.status == OrderStatus::PickedUp {
            summary.active_rentals += 1;
        }
        summary.late_fees_cents += order.late_fee_cents;
    }

    for invoice in invoices {
        summary.invoiced_cents += invoice.total_cents;
        summary.collected_cents += invoice.amount_paid_cents;
        summary.outstanding_cents += invoice.balance_cents();
        summary.platform_fees_cents += invoice.platform_fee_cents;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use chrono::{Duration, Utc};
    use rental_catalog::DateWindow;
    use uuid::Uuid;

    #[test]
    fn test_summary_counts() {
        let users = vec![
            User::new("a@x.io", "h".into(), "A", Role::Admin),
            User::new("v@x.io", "h".into(), "V", Role::Vendor),
            User::new("c@x.io", "h".into(), "C", Role::Customer),
            User::new("d@x.io", "h".into(), "D", Role::Customer),
        ];
        let mut hidden = Product::new(users[1].id, "Drill", 1);
        hidden.is_published = false;
        let products = vec![Product::new(users[1].id, "Tent", 3), hidden];

        let start = Utc::now();
        let window = DateWindow::new(start, start + Duration::days(1)).unwrap();
        let mut picked = SaleOrder::new(users[2].id, users[1].id, window);
        picked.status = OrderStatus::PickedUp;
        let mut late = SaleOrder::new(users[3].id, users[1].id, window);
        late.status = OrderStatus::Returned;
        late.late_fee_cents = 450;

        let summary = build_summary(&users, &products, &[picked, late], &[]);
        assert_eq!(summary.users_by_role["CUSTOMER"], 2);
        assert_eq!(summary.active_users, 4);
        assert_eq!(summary.published_products, 1);
        assert_eq!(summary.orders_by_status["RETURNED"], 1);
        assert_eq!(summary.active_rentals, 1);
        assert_eq!(summary.late_fees_cents, 450);
        assert_eq!(summary.outstanding_cents, 0);
    }
}
