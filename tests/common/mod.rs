//! Shared test utilities and fixtures
//!
//! Every fixture runs against an on-disk database in a temp dir, with a
//! fixed clock and recording side-effect sinks.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use optionpool_engine::{
    AuditSink, CapTable, Clock, EngineError, EngineSettings, NotificationSink, OptionPool,
};
use optionpool_store::{
    CompanyRecord, CompanyStatus, MemberRole, PoolStore, ShareClassRecord, ShareholderRecord,
};
use optionpool_types::{
    AuditAction, AuditEvent, CompanyId, DomainError, NewGrant, NewPlan, Notification, OptionGrant,
    OptionPlan, RuleViolation, ShareClassId, ShareholderId, TerminationPolicy, UserId,
    VestingFrequency,
};

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Unwrap a business rule violation or fail the test.
pub fn rule(err: EngineError) -> RuleViolation {
    match err {
        EngineError::Domain(DomainError::Rule(rule)) => rule,
        other => panic!("expected rule violation, got {other:?}"),
    }
}

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
pub struct Recorder {
    pub audit: Mutex<Vec<AuditEvent>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub recalculations: Mutex<Vec<CompanyId>>,
    pub snapshots: Mutex<Vec<(CompanyId, String)>>,
}

impl Recorder {
    pub fn actions(&self) -> Vec<AuditAction> {
        self.audit.lock().unwrap().iter().map(|e| e.action).collect()
    }

    pub fn events(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.audit
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for Recorder {
    fn log(&self, event: AuditEvent) -> Result<()> {
        self.audit.lock().unwrap().push(event);
        Ok(())
    }
}

impl NotificationSink for Recorder {
    fn notify(&self, notification: Notification) -> Result<()> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

impl CapTable for Recorder {
    fn recalculate_ownership(&self, company_id: CompanyId) -> Result<()> {
        self.recalculations.lock().unwrap().push(company_id);
        Ok(())
    }

    fn create_snapshot(&self, company_id: CompanyId, reason: &str, _note: &str) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap()
            .push((company_id, reason.to_string()));
        Ok(())
    }
}

/// A seeded company with one share class, one linked shareholder and an
/// admin, backed by a database file that lives as long as the fixture.
pub struct Fixture {
    pub dir: TempDir,
    pub pool: Arc<OptionPool>,
    pub clock: Arc<FixedClock>,
    pub recorder: Arc<Recorder>,
    pub company: CompanyId,
    pub class: ShareClassId,
    pub shareholder: ShareholderId,
    pub grantee: UserId,
    pub admin: UserId,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineSettings::default(), at(2025, 6, 1))
}

pub fn fixture_with(settings: EngineSettings, now: DateTime<Utc>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = PoolStore::open(dir.path().join("pool.db"), Duration::from_secs(5)).unwrap();
    let store = Arc::new(store);

    let company = CompanyId::new();
    let class = ShareClassId::new();
    let shareholder = ShareholderId::new();
    let grantee = UserId::new();
    let admin = UserId::new();
    store
        .write(|uow| -> Result<()> {
            uow.insert_company(&CompanyRecord {
                id: company,
                name: "Acme Robotics".into(),
                status: CompanyStatus::Active,
            })?;
            uow.insert_share_class(&ShareClassRecord {
                id: class,
                company_id: company,
                name: "Common".into(),
                total_issued: Decimal::ZERO,
            })?;
            uow.insert_shareholder(&ShareholderRecord {
                id: shareholder,
                company_id: company,
                name: "Grace Hopper".into(),
                user_id: Some(grantee),
            })?;
            uow.upsert_member(company, grantee, MemberRole::Member)?;
            uow.upsert_member(company, admin, MemberRole::Admin)
        })
        .unwrap();

    let clock = Arc::new(FixedClock::new(now));
    let recorder = Arc::new(Recorder::default());
    let pool = OptionPool::new(store, settings)
        .with_clock(clock.clone())
        .with_audit_sink(recorder.clone())
        .with_notification_sink(recorder.clone())
        .with_cap_table(recorder.clone());

    Fixture {
        dir,
        pool: Arc::new(pool),
        clock,
        recorder,
        company,
        class,
        shareholder,
        grantee,
        admin,
    }
}

impl Fixture {
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("pool.db")
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn plan(&self, size: i64) -> OptionPlan {
        self.pool
            .create_plan(
                NewPlan {
                    company_id: self.company,
                    share_class_id: self.class,
                    name: "2024 Stock Option Plan".into(),
                    total_pool_size: dec(size),
                    termination_policy: TerminationPolicy::Forfeiture,
                    exercise_window_days: Some(90),
                    board_approval_date: Some(at(2020, 12, 1)),
                },
                self.admin,
            )
            .unwrap()
    }

    /// Four years monthly with a one year cliff at $5.00, granted
    /// 2021-01-01 and expiring 2031-01-01.
    pub fn terms(&self, plan: &OptionPlan, quantity: i64) -> NewGrant {
        NewGrant {
            plan_id: plan.id,
            shareholder_id: Some(self.shareholder),
            employee_name: "Grace Hopper".into(),
            employee_email: "grace@acme.test".into(),
            quantity: dec(quantity),
            strike_price: Decimal::new(500, 2),
            grant_date: at(2021, 1, 1),
            expiration_date: at(2031, 1, 1),
            cliff_months: 12,
            vesting_duration_months: 48,
            vesting_frequency: VestingFrequency::Monthly,
            acceleration_on_coc: false,
        }
    }

    pub fn grant(&self, plan: &OptionPlan, quantity: i64) -> OptionGrant {
        self.pool
            .create_grant(self.terms(plan, quantity), self.admin)
            .unwrap()
    }

    /// Request and confirm an exercise in one step.
    pub fn exercise(&self, grant: &OptionGrant, quantity: i64) {
        let request = self
            .pool
            .create_exercise_request(grant.id, dec(quantity), self.grantee)
            .unwrap();
        self.pool
            .confirm_exercise_payment(request.id, self.admin)
            .unwrap();
    }

    /// Sum of quantity over the plan's grants that still hold the pool.
    pub fn live_granted(&self, plan: &OptionPlan) -> Decimal {
        self.pool
            .store()
            .read(|r| r.pool_usage(plan.id))
            .unwrap()
            .granted
    }
}
