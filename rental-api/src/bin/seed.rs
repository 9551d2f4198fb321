//! Development data: one admin, two vendors with products, two customers and
//! a welcome coupon. Safe to run twice; existing accounts are left alone.
//!
//! Run with: cargo run --bin seed

use anyhow::Context;
use rental_catalog::{PeriodUnit, Product};
use rental_core::identity::{CustomerProfile, Profile, Role, User, VendorProfile};
use rental_core::repository::Stores;
use rental_order::{Coupon, DiscountKind};
use rental_store::app_config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::load().context("Failed to load config")?;
    if config.database.is_memory() {
        anyhow::bail!("database.url is `memory`; seeding it would be lost on exit");
    }
    let stores = rental_store::open_stores(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let password = std::env::var("SEED_PASSWORD").unwrap_or_else(|_| "password123".to_string());
    let hash = bcrypt::hash(&password, config.auth.bcrypt_cost)?;

    info!("=== Seeding rental marketplace ===");
    seed_user(&stores, "admin@rentals.test", "Platform Admin", Role::Admin, &hash, None).await?;

    let cameras = seed_user(
        &stores,
        "lens@rentals.test",
        "Lens Rentals",
        Role::Vendor,
        &hash,
        Some("Lens Rentals Pvt Ltd"),
    )
    .await?;
    let outdoors = seed_user(
        &stores,
        "trail@rentals.test",
        "Trail Gear",
        Role::Vendor,
        &hash,
        Some("Trail Gear Co"),
    )
    .await?;
    seed_user(&stores, "asha@rentals.test", "Asha", Role::Customer, &hash, None).await?;
    seed_user(&stores, "ravi@rentals.test", "Ravi", Role::Customer, &hash, None).await?;

    if let Some(vendor) = cameras {
        use PeriodUnit::*;
        seed_product(&stores, vendor.id, "Cameras", "Mirrorless Camera", 4, &[(Day, 1_500), (Week, 8_000)]).await?;
        seed_product(&stores, vendor.id, "Cameras", "Telephoto Lens", 2, &[(Day, 900), (Week, 5_000)]).await?;
        seed_product(&stores, vendor.id, "Cameras", "Studio Light Kit", 3, &[(Hour, 300), (Day, 2_000)]).await?;
    }
    if let Some(vendor) = outdoors {
        use PeriodUnit::*;
        seed_product(&stores, vendor.id, "Outdoors", "Four Person Tent", 5, &[(Day, 700), (Week, 3_500)]).await?;
        seed_product(&stores, vendor.id, "Outdoors", "Mountain Bike", 6, &[(Hour, 200), (Day, 1_200)]).await?;
        seed_product(&stores, vendor.id, "Outdoors", "Camping Stove", 8, &[(Day, 250), (Month, 4_000)]).await?;
    }

    if stores.coupons.find_by_code("WELCOME10").await?.is_none() {
        let mut coupon = Coupon::new("WELCOME10", DiscountKind::Percent, 10);
        coupon.min_order_cents = 1_000;
        coupon.max_uses = Some(100);
        stores.coupons.create_coupon(&coupon).await?;
        info!("  Created coupon {}", coupon.code);
    }

    info!("=== Seed complete; every account uses the SEED_PASSWORD ===");
    Ok(())
}

/// Returns the new user, or `None` when the email is already taken.
async fn seed_user(
    stores: &Stores,
    email: &str,
    name: &str,
    role: Role,
    hash: &str,
    business_name: Option<&str>,
) -> anyhow::Result<Option<User>> {
    if stores.users.find_by_email(email).await?.is_some() {
        info!("  {} exists, skipping", email);
        return Ok(None);
    }

    let mut user = User::new(email, hash.to_string(), name, role);
    user.email_verified = true;
    user.verification_token = None;

    let profile = match role {
        Role::Vendor => Profile::Vendor(VendorProfile {
            user_id: user.id,
            business_name: business_name.unwrap_or(name).to_string(),
            gstin: None,
            phone: None,
        }),
        Role::Customer => Profile::Customer(CustomerProfile {
            user_id: user.id,
            phone: None,
            address: None,
        }),
        Role::Admin => Profile::None,
    };
    stores.users.create_user(&user, &profile).await?;
    info!("  Created {} {}", role, user.masked_email());
    Ok(Some(user))
}

async fn seed_product(
    stores: &Stores,
    vendor_id: uuid::Uuid,
    category: &str,
    name: &str,
    quantity: i32,
    tiers: &[(PeriodUnit, i64)],
) -> anyhow::Result<()> {
    let mut product = Product::new(vendor_id, name, quantity);
    product.category = Some(category.to_string());
    for &(unit, price) in tiers {
        product = product.with_tier(unit, price);
    }
    product.validate(&PeriodUnit::ALL)?;
    stores.products.create_product(&product).await?;
    info!("  Created product {}", product.name);
    Ok(())
}
