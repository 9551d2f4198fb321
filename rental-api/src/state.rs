use rental_core::billing::Billing;
use rental_core::lifecycle::OrderLifecycle;
use rental_core::notify::Mailer;
use rental_core::repository::Stores;
use rental_core::settings::{effective_rules, RentalRules};
use rental_core::CoreResult;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub bcrypt_cost: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub lifecycle: OrderLifecycle,
    pub billing: Billing,
    pub mailer: Arc<dyn Mailer>,
    pub auth: AuthConfig,
    /// Config-file rules; admin overrides are layered on top per request.
    pub rules: RentalRules,
    pub public_url: String,
}

impl AppState {
    pub fn new(
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        auth: AuthConfig,
        rules: RentalRules,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle: OrderLifecycle::new(stores.clone(), mailer.clone(), rules.clone()),
            billing: Billing::new(stores.clone()),
            stores,
            mailer,
            auth,
            rules,
            public_url: public_url.into(),
        }
    }

    pub async fn effective_rules(&self) -> CoreResult<RentalRules> {
        effective_rules(self.stores.settings.as_ref(), &self.rules).await
    }
}
