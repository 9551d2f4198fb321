use chrono::Duration;
use rental_catalog::PeriodUnit;
use rental_order::{InvoiceRates, LateFeePolicy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::repository::SettingsRepository;
use crate::{CoreError, CoreResult};

/// Marketplace-wide rules. Defaults come from the `rules` config section and
/// admins override single keys through the settings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRules {
    pub platform_fee_percent: f64,
    pub gst_percent: f64,
    pub late_fee_daily_rate: f64,
    pub grace_period_hours: i64,
    pub rental_periods: Vec<PeriodUnit>,
    #[serde(default = "default_notice_min")]
    pub expiry_notice_min_minutes: i64,
    #[serde(default = "default_notice_max")]
    pub expiry_notice_max_minutes: i64,
}

fn default_notice_min() -> i64 { 5 }
fn default_notice_max() -> i64 { 10 }

impl Default for RentalRules {
    fn default() -> Self {
        Self {
            platform_fee_percent: 10.0,
            gst_percent: 18.0,
            late_fee_daily_rate: 0.1,
            grace_period_hours: 2,
            rental_periods: PeriodUnit::ALL.to_vec(),
            expiry_notice_min_minutes: default_notice_min(),
            expiry_notice_max_minutes: default_notice_max(),
        }
    }
}

/// One year.
pub const MAX_GRACE_PERIOD_HOURS: i64 = 8_760;
/// One week.
pub const MAX_NOTICE_MINUTES: i64 = 10_080;

impl RentalRules {
    pub const KEYS: [&'static str; 7] = [
        "platform_fee_percent",
        "gst_percent",
        "late_fee_daily_rate",
        "grace_period_hours",
        "rental_periods",
        "expiry_notice_min_minutes",
        "expiry_notice_max_minutes",
    ];

    pub fn late_fee_policy(&self) -> LateFeePolicy {
        LateFeePolicy::new(self.late_fee_daily_rate, self.grace_period_hours)
    }

    pub fn invoice_rates(&self) -> InvoiceRates {
        InvoiceRates {
            gst_percent: self.gst_percent,
            platform_fee_percent: self.platform_fee_percent,
        }
    }

    /// Offsets from now bounding the expiry notice window.
    pub fn notice_window(&self) -> CoreResult<(Duration, Duration)> {
        let offset = |minutes: i64| {
            Duration::try_minutes(minutes).ok_or_else(|| {
                CoreError::Validation(format!("expiry notice offset out of range: {}", minutes))
            })
        };
        Ok((
            offset(self.expiry_notice_min_minutes)?,
            offset(self.expiry_notice_max_minutes)?,
        ))
    }

    /// Validate and set one key. On error the rules are unchanged.
    pub fn apply_override(&mut self, key: &str, value: &Value) -> CoreResult<()> {
        let mut next = self.clone();
        next.set(key, value)?;
        next.check_notice_window()?;
        *self = next;
        Ok(())
    }

    /// Apply several overrides at once; nothing changes if any is rejected.
    pub fn apply_overrides(&mut self, changes: &Map<String, Value>) -> CoreResult<()> {
        let mut next = self.clone();
        for (key, value) in changes {
            next.set(key, value)?;
        }
        next.check_notice_window()?;
        *self = next;
        Ok(())
    }

    fn set(&mut self, key: &str, value: &Value) -> CoreResult<()> {
        match key {
            "platform_fee_percent" => self.platform_fee_percent = percent(key, value)?,
            "gst_percent" => self.gst_percent = percent(key, value)?,
            "late_fee_daily_rate" => {
                let rate = number(key, value)?;
                if rate < 0.0 {
                    return Err(invalid(key, "must not be negative"));
                }
                self.late_fee_daily_rate = rate;
            }
            "grace_period_hours" => {
                self.grace_period_hours = bounded_int(key, value, MAX_GRACE_PERIOD_HOURS)?
            }
            "rental_periods" => self.rental_periods = periods(key, value)?,
            "expiry_notice_min_minutes" => {
                self.expiry_notice_min_minutes = bounded_int(key, value, MAX_NOTICE_MINUTES)?
            }
            "expiry_notice_max_minutes" => {
                self.expiry_notice_max_minutes = bounded_int(key, value, MAX_NOTICE_MINUTES)?
            }
            other => {
                return Err(CoreError::Validation(format!("unknown setting: {}", other)));
            }
        }
        Ok(())
    }

    fn check_notice_window(&self) -> CoreResult<()> {
        if self.expiry_notice_min_minutes >= self.expiry_notice_max_minutes {
            return Err(CoreError::Validation(
                "expiry notice minimum must be below the maximum".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn invalid(key: &str, reason: &str) -> CoreError {
    CoreError::Validation(format!("{}: {}", key, reason))
}

fn number(key: &str, value: &Value) -> CoreResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| invalid(key, "expected a number"))
}

fn percent(key: &str, value: &Value) -> CoreResult<f64> {
    let pct = number(key, value)?;
    if !(0.0..=100.0).contains(&pct) {
        return Err(invalid(key, "must be between 0 and 100"));
    }
    Ok(pct)
}

fn bounded_int(key: &str, value: &Value, max: i64) -> CoreResult<i64> {
    match value.as_i64() {
        Some(n) if n < 0 => Err(invalid(key, "must not be negative")),
        Some(n) if n > max => Err(invalid(key, &format!("must be at most {}", max))),
        Some(n) => Ok(n),
        None => Err(invalid(key, "expected an integer")),
    }
}

fn periods(key: &str, value: &Value) -> CoreResult<Vec<PeriodUnit>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(key, "expected a list of periods"))?;

    let mut units = Vec::new();
    for item in items {
        let unit: PeriodUnit = item
            .as_str()
            .ok_or_else(|| invalid(key, "expected period names"))?
            .parse()
            .map_err(|e: String| invalid(key, &e))?;
        if !units.contains(&unit) {
            units.push(unit);
        }
    }
    if units.is_empty() {
        return Err(invalid(key, "at least one period must stay enabled"));
    }
    units.sort();
    Ok(units)
}

/// Defaults merged with the stored overrides. Invalid rows are skipped.
pub async fn effective_rules(
    repo: &dyn SettingsRepository,
    defaults: &RentalRules,
) -> CoreResult<RentalRules> {
    let rows = repo.list_settings().await?;
    let mut rules = defaults.clone();

    for row in rows {
        // Expected format: {"value": <number/string/list>}
        let Some(value) = row.value.get("value") else {
            warn!("Setting {} has no value envelope, skipping", row.key);
            continue;
        };
        if let Err(e) = rules.apply_override(&row.key, value) {
            warn!("Ignoring stored setting {}: {}", row.key, e);
        }
    }

    Ok(rules)
}

/// Validate `changes` against the current rules and persist them.
pub async fn update_settings(
    repo: &dyn SettingsRepository,
    defaults: &RentalRules,
    changes: &Map<String, Value>,
) -> CoreResult<RentalRules> {
    if changes.is_empty() {
        return Err(CoreError::Validation("no settings given".to_string()));
    }

    let mut rules = effective_rules(repo, defaults).await?;
    rules.apply_overrides(changes)?;

    for (key, value) in changes {
        repo.upsert_setting(key, &json!({ "value": value })).await?;
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SystemSetting;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSettings {
        rows: Mutex<Vec<SystemSetting>>,
    }

    #[async_trait]
    impl SettingsRepository for FakeSettings {
        async fn list_settings(&self) -> CoreResult<Vec<SystemSetting>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn upsert_setting(&self, key: &str, value: &Value) -> CoreResult<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|r| r.key != key);
            rows.push(SystemSetting {
                key: key.to_string(),
                value: value.clone(),
            });
            Ok(())
        }
    }

    #[test]
    fn test_override_validation() {
        let mut rules = RentalRules::default();
        rules.apply_override("gst_percent", &json!(12.5)).unwrap();
        assert_eq!(rules.gst_percent, 12.5);

        assert!(rules.apply_override("gst_percent", &json!(101)).is_err());
        assert!(rules.apply_override("late_fee_daily_rate", &json!(-0.5)).is_err());
        assert!(rules.apply_override("grace_period_hours", &json!("two")).is_err());
        assert!(rules.apply_override("expiry_notice_min_minutes", &json!(10)).is_err());
        assert!(matches!(
            rules.apply_override("favourite_colour", &json!("blue")),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(rules.gst_percent, 12.5);

        rules
            .apply_override("rental_periods", &json!(["week", "DAY", "day"]))
            .unwrap();
        assert_eq!(rules.rental_periods, vec![PeriodUnit::Day, PeriodUnit::Week]);
        assert!(rules.apply_override("rental_periods", &json!([])).is_err());
    }

    #[test]
    fn test_apply_overrides_is_all_or_nothing() {
        let mut rules = RentalRules::default();
        let changes = json!({"platform_fee_percent": 5, "gst_percent": 500});
        assert!(rules.apply_overrides(changes.as_object().unwrap()).is_err());
        assert_eq!(rules.platform_fee_percent, 10.0);

        let widen = json!({"expiry_notice_min_minutes": 20, "expiry_notice_max_minutes": 30});
        rules.apply_overrides(widen.as_object().unwrap()).unwrap();
        assert_eq!(rules.notice_window().unwrap().0, Duration::minutes(20));
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let mut rules = RentalRules::default();
        assert!(rules
            .apply_override("expiry_notice_max_minutes", &json!(1_000_000_000_000_i64))
            .is_err());
        assert!(rules
            .apply_override("grace_period_hours", &json!(MAX_GRACE_PERIOD_HOURS + 1))
            .is_err());
        assert_eq!(rules, RentalRules::default());

        rules
            .apply_override("grace_period_hours", &json!(MAX_GRACE_PERIOD_HOURS))
            .unwrap();
        rules
            .apply_override("expiry_notice_max_minutes", &json!(MAX_NOTICE_MINUTES))
            .unwrap();
        assert_eq!(rules.notice_window().unwrap().1, Duration::weeks(1));

        // Defaults loaded from config skip per-key validation.
        rules.expiry_notice_max_minutes = i64::MAX;
        assert!(matches!(rules.notice_window(), Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_effective_rules_skip_invalid_rows() {
        let repo = FakeSettings::default();
        repo.upsert_setting("platform_fee_percent", &json!({"value": 7.5})).await.unwrap();
        repo.upsert_setting("gst_percent", &json!({"value": "lots"})).await.unwrap();
        repo.upsert_setting("grace_period_hours", &json!(4)).await.unwrap();
        repo.upsert_setting("expiry_notice_max_minutes", &json!({"value": i64::MAX}))
            .await
            .unwrap();

        let defaults = RentalRules::default();
        let rules = effective_rules(&repo, &defaults).await.unwrap();
        assert_eq!(rules.platform_fee_percent, 7.5);
        assert_eq!(rules.gst_percent, defaults.gst_percent);
        assert_eq!(rules.grace_period_hours, defaults.grace_period_hours);
        assert_eq!(rules.expiry_notice_max_minutes, defaults.expiry_notice_max_minutes);
    }

    #[tokio::test]
    async fn test_update_settings_persists_envelopes() {
        let repo = FakeSettings::default();
        let defaults = RentalRules::default();
        let changes = json!({"late_fee_daily_rate": 0.25});

        let rules = update_settings(&repo, &defaults, changes.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(rules.late_fee_daily_rate, 0.25);
        assert_eq!(repo.list_settings().await.unwrap()[0].value, json!({"value": 0.25}));

        let bad = json!({"nope": 1});
        assert!(update_settings(&repo, &defaults, bad.as_object().unwrap()).await.is_err());
    }
}
