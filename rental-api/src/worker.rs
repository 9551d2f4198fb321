use chrono::{DateTime, Utc};
use rental_core::audit::AuditEntry;
use rental_core::notify::{self, Mailer};
use rental_core::repository::Stores;
use rental_core::settings::{effective_rules, RentalRules};
use rental_core::{CoreError, CoreResult};
use rental_order::SaleOrder;
use rental_shared::models::events::ExpiryNoticeSentEvent;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Emails customers whose picked-up rental ends soon, once per order.
#[derive(Clone)]
pub struct ExpiryNotifier {
    stores: Stores,
    mailer: Arc<dyn Mailer>,
    defaults: RentalRules,
}

impl ExpiryNotifier {
    pub fn new(stores: Stores, mailer: Arc<dyn Mailer>, defaults: RentalRules) -> Self {
        Self {
            stores,
            mailer,
            defaults,
        }
    }

    /// One polling pass. Returns how many notices this pass claimed.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let rules = effective_rules(self.stores.settings.as_ref(), &self.defaults).await?;
        let (min, max) = rules.notice_window()?;
        let (Some(from), Some(to)) = (now.checked_add_signed(min), now.checked_add_signed(max))
        else {
            return Err(CoreError::Validation(
                "expiry notice window is out of range".to_string(),
            ));
        };
        let due = self.stores.orders.due_for_expiry_notice(from, to).await?;

        let mut claimed = 0;
        for order in due {
            // A concurrent pass may have claimed it between the query and here.
            if !self.stores.orders.mark_expiry_notified(order.id, now).await? {
                continue;
            }
            claimed += 1;
            self.notify(&order, now).await;
        }

        if claimed > 0 {
            info!("Sent {} rental expiry notice(s)", claimed);
        }
        Ok(claimed)
    }

    async fn notify(&self, order: &SaleOrder, now: DateTime<Utc>) {
        let delivered = match self.stores.users.get_user(order.customer_id).await {
            Ok(Some(customer)) => {
                let message = notify::expiry_reminder_email(order, &customer);
                notify::deliver(self.mailer.as_ref(), &message).await
            }
            Ok(None) => {
                warn!("Customer {} of order {} not found", order.customer_id, order.number);
                false
            }
            Err(e) => {
                warn!("Could not load customer of order {}: {}", order.number, e);
                false
            }
        };

        let event = ExpiryNoticeSentEvent {
            order_id: order.id,
            customer_id: order.customer_id,
            end_date: order.end_date,
            delivered,
            timestamp: now,
        };
        let entry = AuditEntry::new(
            None,
            "order.expiry_notice",
            "order",
            order.id,
            serde_json::to_value(&event).unwrap_or_default(),
        );
        if let Err(e) = self.stores.audit.append(&entry).await {
            warn!("Failed to write audit entry {}: {}", entry.action, e);
        }
    }

    /// Polls until the process exits. A failed pass is logged and the next tick runs as usual.
    pub async fn run(self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Expiry notifier started, polling every {:?}", every);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                error!("Expiry notifier pass failed: {}", e);
            }
        }
    }
}

pub fn start_expiry_notifier(notifier: ExpiryNotifier, interval_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(notifier.run(Duration::from_secs(interval_seconds.max(1))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use rental_catalog::DateWindow;
    use rental_core::identity::{CustomerProfile, Profile, Role, User};
    use rental_core::notify::{EmailMessage, MailError};
    use rental_order::OrderStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(message.subject.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
            Err(MailError::Transport("smtp down".into()))
        }
    }

    async fn customer(stores: &Stores) -> User {
        let user = User::new("renter@rentals.test", "hash".into(), "Renter", Role::Customer);
        let profile = Profile::Customer(CustomerProfile {
            user_id: user.id,
            phone: None,
            address: None,
        });
        stores.users.create_user(&user, &profile).await.unwrap();
        user
    }

    async fn order_ending_at(
        stores: &Stores,
        customer: &User,
        end: DateTime<Utc>,
        status: OrderStatus,
    ) -> SaleOrder {
        let window = DateWindow::new(end - ChronoDuration::days(2), end).unwrap();
        let mut order = SaleOrder::new(customer.id, uuid::Uuid::new_v4(), window);
        order.status = status;
        stores.orders.create_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_notice_sent_exactly_once() {
        let stores = rental_store::memory_stores();
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = ExpiryNotifier::new(stores.clone(), mailer.clone(), RentalRules::default());
        let now = Utc::now();
        let renter = customer(&stores).await;
        let order = order_ending_at(
            &stores,
            &renter,
            now + ChronoDuration::minutes(7),
            OrderStatus::PickedUp,
        )
        .await;

        assert_eq!(notifier.run_once(now).await.unwrap(), 1);
        assert_eq!(notifier.run_once(now).await.unwrap(), 0);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        let stored = stores.orders.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.expiry_notified_at, Some(now));
    }

    #[tokio::test]
    async fn test_ignores_orders_outside_window_or_not_picked_up() {
        let stores = rental_store::memory_stores();
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = ExpiryNotifier::new(stores.clone(), mailer.clone(), RentalRules::default());
        let now = Utc::now();
        let renter = customer(&stores).await;

        order_ending_at(&stores, &renter, now + ChronoDuration::minutes(2), OrderStatus::PickedUp).await;
        order_ending_at(&stores, &renter, now + ChronoDuration::minutes(30), OrderStatus::PickedUp).await;
        order_ending_at(&stores, &renter, now + ChronoDuration::minutes(7), OrderStatus::Confirmed).await;

        assert_eq!(notifier.run_once(now).await.unwrap(), 0);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mail_failure_still_claims_notice() {
        let stores = rental_store::memory_stores();
        let notifier = ExpiryNotifier::new(stores.clone(), Arc::new(FailingMailer), RentalRules::default());
        let now = Utc::now();
        let renter = customer(&stores).await;
        order_ending_at(&stores, &renter, now + ChronoDuration::minutes(6), OrderStatus::PickedUp).await;

        assert_eq!(notifier.run_once(now).await.unwrap(), 1);
        assert_eq!(notifier.run_once(now + ChronoDuration::seconds(60)).await.unwrap(), 0);

        let log = stores.audit.list_recent(10).await.unwrap();
        assert_eq!(log[0].action, "order.expiry_notice");
        assert_eq!(log[0].detail["delivered"], false);
    }

    #[tokio::test]
    async fn test_oversized_notice_window_fails_the_pass_without_panicking() {
        let stores = rental_store::memory_stores();
        let mailer = Arc::new(RecordingMailer::default());
        let now = Utc::now();
        let renter = customer(&stores).await;
        order_ending_at(&stores, &renter, now + ChronoDuration::minutes(7), OrderStatus::PickedUp).await;

        let changes = serde_json::json!({"expiry_notice_max_minutes": 1_000_000_000_000_i64});
        let defaults = RentalRules::default();
        let rejected = rental_core::settings::update_settings(
            stores.settings.as_ref(),
            &defaults,
            changes.as_object().unwrap(),
        )
        .await;
        assert!(matches!(rejected, Err(CoreError::Validation(_))));

        // A row written behind the validation is skipped.
        stores
            .settings
            .upsert_setting(
                "expiry_notice_max_minutes",
                &serde_json::json!({"value": 1_000_000_000_000_i64}),
            )
            .await
            .unwrap();
        let notifier = ExpiryNotifier::new(stores.clone(), mailer.clone(), defaults);
        assert_eq!(notifier.run_once(now).await.unwrap(), 1);

        let broken = RentalRules {
            expiry_notice_max_minutes: i64::MAX,
            ..RentalRules::default()
        };
        let notifier = ExpiryNotifier::new(stores.clone(), mailer.clone(), broken);
        let pass = tokio::spawn(async move { notifier.run_once(Utc::now()).await });
        let result = pass.await.expect("pass must not panic");
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let edge = RentalRules::default();
        let notifier = ExpiryNotifier::new(stores.clone(), mailer, edge);
        let result = notifier.run_once(DateTime::<Utc>::MAX_UTC).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
