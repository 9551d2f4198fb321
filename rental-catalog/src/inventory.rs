use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Half-open rental window `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InventoryError> {
        if start >= end {
            return Err(InventoryError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Windows that merely touch (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &DateWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A hold on product quantity for a confirmed or picked-up order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Reservation {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: i32, window: DateWindow) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            start: window.start,
            end: window.end,
        }
    }

    pub fn window(&self) -> DateWindow {
        DateWindow {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Quantity of `product_id` held by reservations overlapping `window`.
pub fn reserved_in_window(reservations: &[Reservation], product_id: Uuid, window: &DateWindow) -> i32 {
    reservations
        .iter()
        .filter(|r| r.product_id == product_id && r.window().overlaps(window))
        .map(|r| r.quantity)
        .sum()
}

/// Quantity still free for `window`. Never negative, even when the vendor
/// lowered their stock below what is already reserved.
pub fn available_in_window(
    total: i32,
    reservations: &[Reservation],
    product_id: Uuid,
    window: &DateWindow,
) -> i32 {
    (total - reserved_in_window(reservations, product_id, window)).max(0)
}

/// Sums requested quantities per product so a batch naming the same product
/// twice is checked against its combined demand.
pub fn merge_requests(requests: &[ReservationRequest]) -> Result<BTreeMap<Uuid, i32>, InventoryError> {
    let mut merged = BTreeMap::new();
    for request in requests {
        if request.quantity <= 0 {
            return Err(InventoryError::InvalidQuantity {
                product_id: request.product_id,
                quantity: request.quantity,
            });
        }
        *merged.entry(request.product_id).or_insert(0) += request.quantity;
    }
    Ok(merged)
}

/// In-memory reservation ledger.
pub struct InventoryManager {
    reservations: Vec<Reservation>,
}

impl InventoryManager {
    pub fn new() -> Self {
        Self {
            reservations: Vec::new(),
        }
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn for_order(&self, order_id: &Uuid) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|r| &r.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn for_product(&self, product_id: &Uuid) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|r| &r.product_id == product_id)
            .cloned()
            .collect()
    }

    pub fn reserved(&self, product_id: Uuid, window: &DateWindow) -> i32 {
        reserved_in_window(&self.reservations, product_id, window)
    }

    pub fn available(&self, product_id: Uuid, total: i32, window: &DateWindow) -> i32 {
        available_in_window(total, &self.reservations, product_id, window)
    }

    /// Reserve a batch for one order, one reservation per product. Either every
    /// request fits or nothing is recorded. `capacity` returns the stock of a product, `None` if unknown.
    pub fn reserve<F>(
        &mut self,
        order_id: Uuid,
        window: DateWindow,
        requests: &[ReservationRequest],
        capacity: F,
    ) -> Result<Vec<Reservation>, InventoryError>
    where
        F: Fn(&Uuid) -> Option<i32>,
    {
        let merged = merge_requests(requests)?;

        for (product_id, requested) in &merged {
            let total = capacity(product_id)
                .ok_or_else(|| InventoryError::NotFound(product_id.to_string()))?;
            let available = self.available(*product_id, total, &window);
            if *requested > available {
                return Err(InventoryError::InsufficientInventory {
                    product_id: *product_id,
                    requested: *requested,
                    available,
                });
            }
        }

        let created: Vec<Reservation> = merged
            .into_iter()
            .map(|(product_id, quantity)| Reservation::new(order_id, product_id, quantity, window))
            .collect();
        self.reservations.extend(created.iter().cloned());
        Ok(created)
    }

    /// Drop every reservation held by the order.
    pub fn release_order(&mut self, order_id: &Uuid) -> usize {
        let before = self.reservations.len();
        self.reservations.retain(|r| &r.order_id != order_id);
        before - self.reservations.len()
    }

    /// Share of the stock that is reserved during the window.
    pub fn utilization(&self, product_id: Uuid, total: i32, window: &DateWindow) -> f64 {
        if total <= 0 {
            return 0.0;
        }
        let reserved = self.reserved(product_id, window).min(total);
        reserved as f64 / total as f64
    }
}

impl Default for InventoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InventoryError {
    #[error("Inventory not found: {0}")]
    NotFound(String),

    #[error("Insufficient inventory for product {product_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },

    #[error("Rental window must end after it starts ({start} - {end})")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn window(from: (u32, u32), to: (u32, u32)) -> DateWindow {
        DateWindow::new(at(from.0, from.1), at(to.0, to.1)).unwrap()
    }

    #[test]
    fn test_overlap_rules() {
        let base = window((10, 0), (12, 0));
        assert!(base.overlaps(&window((11, 0), (13, 0))));
        assert!(base.overlaps(&window((9, 0), (10, 1))));
        assert!(base.overlaps(&window((10, 6), (10, 8))));
        assert!(window((9, 0), (14, 0)).overlaps(&base));
        // touching edges are free
        assert!(!base.overlaps(&window((12, 0), (13, 0))));
        assert!(!base.overlaps(&window((8, 0), (10, 0))));
    }

    #[test]
    fn test_invalid_window() {
        assert!(DateWindow::new(at(10, 0), at(10, 0)).is_err());
        assert!(DateWindow::new(at(11, 0), at(10, 0)).is_err());
    }

    #[test]
    fn test_inventory_lifecycle() {
        let mut manager = InventoryManager::new();
        let product_id = Uuid::new_v4();
        let order_a = Uuid::new_v4();
        let order_b = Uuid::new_v4();
        let stock = |_: &Uuid| Some(3);

        let w = window((10, 0), (12, 0));
        manager
            .reserve(order_a, w, &[ReservationRequest { product_id, quantity: 2 }], stock)
            .unwrap();
        assert_eq!(manager.available(product_id, 3, &w), 1);

        let err = manager
            .reserve(order_b, window((11, 0), (13, 0)), &[ReservationRequest { product_id, quantity: 2 }], stock)
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientInventory { product_id, requested: 2, available: 1 }
        );

        // back-to-back rental does not collide
        manager
            .reserve(order_b, window((12, 0), (14, 0)), &[ReservationRequest { product_id, quantity: 3 }], stock)
            .unwrap();

        assert_eq!(manager.release_order(&order_a), 1);
        assert_eq!(manager.available(product_id, 3, &w), 3);
        assert!((manager.utilization(product_id, 3, &window((12, 0), (13, 0))) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut manager = InventoryManager::new();
        let tent = Uuid::new_v4();
        let stove = Uuid::new_v4();
        let order = Uuid::new_v4();
        let capacity = move |id: &Uuid| if *id == tent { Some(5) } else { Some(1) };

        let err = manager.reserve(
            order,
            window((1, 0), (3, 0)),
            &[
                ReservationRequest { product_id: tent, quantity: 2 },
                ReservationRequest { product_id: stove, quantity: 1 },
                ReservationRequest { product_id: stove, quantity: 1 },
            ],
            capacity,
        );
        assert!(matches!(err, Err(InventoryError::InsufficientInventory { requested: 2, .. })));
        assert!(manager.reservations().is_empty());
    }

    #[test]
    fn test_availability_never_negative() {
        let product_id = Uuid::new_v4();
        let w = window((5, 0), (6, 0));
        let held = vec![Reservation::new(Uuid::new_v4(), product_id, 4, w)];
        assert_eq!(available_in_window(2, &held, product_id, &w), 0);
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let mut manager = InventoryManager::new();
        let product_id = Uuid::new_v4();
        let err = manager
            .reserve(Uuid::new_v4(), window((1, 0), (2, 0)), &[ReservationRequest { product_id, quantity: 0 }], |_| Some(1))
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity { .. }));
    }
}
