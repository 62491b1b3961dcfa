//! SeaORM-backed subscription and usage storage.
//!
//! Implements both [`SubscriptionStore`] and [`UsageSource`] over one
//! PostgreSQL connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use waymark::{SeaOrmPolicyStore, SubscriptionPolicy};
//!
//! let store = SeaOrmPolicyStore::new(db.clone());
//! let policy = SubscriptionPolicy::new(store.clone(), store);
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    UpdateMany,
    entity::prelude::*,
    sea_query::{OnConflict, SimpleExpr},
};

use crate::error::{PolicyError, Result};
use crate::plans::{BillingCycle, PlanFeatures, PlanId, PlanLimits};
use crate::subscription::{
    Cancellation, CompanySubscription, PlanChange, Reconciliation, RecordStatus,
    SubscriptionRecord, SubscriptionStatus, SubscriptionStore,
};
use crate::usage::UsageSource;

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    use sea_orm::entity::prelude::*;

    pub mod company {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "companies")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub subscription_plan: String,
            pub subscription_status: String,
            pub billing_cycle: String,
            pub subscription_start_date: Option<DateTimeWithTimeZone>,
            pub subscription_end_date: Option<DateTimeWithTimeZone>,
            pub trial_end_date: Option<DateTimeWithTimeZone>,
            #[sea_orm(column_type = "JsonBinary")]
            pub features: Json,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod subscription {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "subscriptions")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: Uuid,
            #[sea_orm(indexed)]
            pub company_id: String,
            pub plan_id: String,
            pub plan_name: String,
            pub status: String,
            pub billing_cycle: String,
            pub price_cents: i64,
            pub currency: String,
            pub start_date: DateTimeWithTimeZone,
            pub end_date: Option<DateTimeWithTimeZone>,
            #[sea_orm(column_type = "JsonBinary")]
            pub limits: Json,
            pub notes: Option<String>,
            pub created_by: String,
            pub modified_by: Option<String>,
            pub cancelled_by: Option<String>,
            pub cancellation_reason: Option<String>,
            pub created_at: DateTimeWithTimeZone,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod package {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "packages")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(indexed)]
            pub company_id: String,
            pub is_active: bool,
            pub photo_count: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod order {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "orders")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(indexed)]
            pub company_id: String,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod company_document {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "company_documents")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(indexed)]
            pub company_id: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod staff_account {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "staff_accounts")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(indexed)]
            pub company_id: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{company, company_document, order, package, staff_account, subscription};

// =============================================================================
// Helper Functions
// =============================================================================

/// Convert i32 to u64 safely (negative values become 0).
#[inline]
fn i32_to_u64(value: i32) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[inline]
fn to_db_time(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.fixed_offset()
}

#[inline]
fn from_db_time(at: DateTimeWithTimeZone) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

/// Parse a stored string column, reporting bad rows as store errors.
fn decode<T>(column: &str, value: &str) -> Result<T>
where
    T: FromStr<Err = PolicyError>,
{
    value
        .parse()
        .map_err(|e| PolicyError::store("decode", format!("{}: {}", column, e)))
}

fn decode_json<T: serde::de::DeserializeOwned>(column: &str, value: Json) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| PolicyError::store("decode", format!("{}: {}", column, e)))
}

fn encode_json<T: serde::Serialize>(column: &str, value: &T) -> Result<Json> {
    serde_json::to_value(value)
        .map_err(|e| PolicyError::store("encode", format!("{}: {}", column, e)))
}

fn model_to_company(model: company::Model) -> Result<CompanySubscription> {
    Ok(CompanySubscription {
        plan_id: decode::<PlanId>("subscription_plan", &model.subscription_plan)?,
        status: decode::<SubscriptionStatus>("subscription_status", &model.subscription_status)?,
        billing_cycle: decode::<BillingCycle>("billing_cycle", &model.billing_cycle)?,
        subscription_start_date: model.subscription_start_date.map(from_db_time),
        subscription_end_date: model.subscription_end_date.map(from_db_time),
        trial_end_date: model.trial_end_date.map(from_db_time),
        features: decode_json::<PlanFeatures>("features", model.features)?,
        company_id: model.id,
    })
}

fn company_to_active_model(
    company: &CompanySubscription,
    now: DateTimeWithTimeZone,
) -> Result<company::ActiveModel> {
    Ok(company::ActiveModel {
        id: Set(company.company_id.clone()),
        subscription_plan: Set(company.plan_id.as_str().to_string()),
        subscription_status: Set(company.status.as_str().to_string()),
        billing_cycle: Set(company.billing_cycle.as_str().to_string()),
        subscription_start_date: Set(company.subscription_start_date.map(to_db_time)),
        subscription_end_date: Set(company.subscription_end_date.map(to_db_time)),
        trial_end_date: Set(company.trial_end_date.map(to_db_time)),
        features: Set(encode_json("features", &company.features)?),
        updated_at: Set(now),
    })
}

fn model_to_record(model: subscription::Model) -> Result<SubscriptionRecord> {
    Ok(SubscriptionRecord {
        id: model.id,
        plan_id: decode::<PlanId>("plan_id", &model.plan_id)?,
        status: decode::<RecordStatus>("status", &model.status)?,
        billing_cycle: decode::<BillingCycle>("billing_cycle", &model.billing_cycle)?,
        limits: decode_json::<PlanLimits>("limits", model.limits)?,
        company_id: model.company_id,
        plan_name: model.plan_name,
        price_cents: model.price_cents,
        currency: model.currency,
        start_date: from_db_time(model.start_date),
        end_date: model.end_date.map(from_db_time),
        notes: model.notes,
        created_by: model.created_by,
        modified_by: model.modified_by,
        cancelled_by: model.cancelled_by,
        cancellation_reason: model.cancellation_reason,
        created_at: from_db_time(model.created_at),
        updated_at: from_db_time(model.updated_at),
    })
}

fn record_to_active_model(record: &SubscriptionRecord) -> Result<subscription::ActiveModel> {
    Ok(subscription::ActiveModel {
        id: Set(record.id),
        company_id: Set(record.company_id.clone()),
        plan_id: Set(record.plan_id.as_str().to_string()),
        plan_name: Set(record.plan_name.clone()),
        status: Set(record.status.as_str().to_string()),
        billing_cycle: Set(record.billing_cycle.as_str().to_string()),
        price_cents: Set(record.price_cents),
        currency: Set(record.currency.clone()),
        start_date: Set(to_db_time(record.start_date)),
        end_date: Set(record.end_date.map(to_db_time)),
        limits: Set(encode_json("limits", &record.limits)?),
        notes: Set(record.notes.clone()),
        created_by: Set(record.created_by.clone()),
        modified_by: Set(record.modified_by.clone()),
        cancelled_by: Set(record.cancelled_by.clone()),
        cancellation_reason: Set(record.cancellation_reason.clone()),
        created_at: Set(to_db_time(record.created_at)),
        updated_at: Set(to_db_time(record.updated_at)),
    })
}

/// Write the cancellation fields of an already-cancelled record.
async fn save_cancelled(txn: &DatabaseTransaction, record: &SubscriptionRecord) -> Result<()> {
    subscription::ActiveModel {
        id: Set(record.id),
        status: Set(record.status.as_str().to_string()),
        modified_by: Set(record.modified_by.clone()),
        cancelled_by: Set(record.cancelled_by.clone()),
        cancellation_reason: Set(record.cancellation_reason.clone()),
        updated_at: Set(to_db_time(record.updated_at)),
        ..Default::default()
    }
    .update(txn)
    .await?;
    Ok(())
}

/// Take the company row lock for the rest of the transaction.
///
/// Admin writes for one company queue behind each other here, so two of them
/// can never both supersede the same active record.
async fn lock_company(txn: &DatabaseTransaction, company_id: &str) -> Result<()> {
    company::Entity::find_by_id(company_id)
        .lock_exclusive()
        .one(txn)
        .await?;
    Ok(())
}

fn date_matches(column: company::Column, value: Option<DateTime<Utc>>) -> SimpleExpr {
    match value {
        Some(at) => column.eq(to_db_time(at)),
        None => column.is_null(),
    }
}

/// Stored spellings that decode to `status`.
fn status_spellings(status: SubscriptionStatus) -> &'static [&'static str] {
    match status {
        SubscriptionStatus::Trial => &["trial", "trialing"],
        SubscriptionStatus::Active => &["active"],
        SubscriptionStatus::Expired => &["expired"],
        SubscriptionStatus::Cancelled => &["cancelled", "canceled"],
    }
}

/// `UPDATE companies ... WHERE` the row still holds the expected projection.
fn reconcile_update(reconciliation: &Reconciliation) -> Result<UpdateMany<company::Entity>> {
    let expected = &reconciliation.expected;
    Ok(company::Entity::update_many()
        .col_expr(
            company::Column::SubscriptionStatus,
            Expr::value(reconciliation.status.as_str()),
        )
        .col_expr(
            company::Column::Features,
            Expr::value(encode_json("features", &reconciliation.features)?),
        )
        .col_expr(
            company::Column::UpdatedAt,
            Expr::value(to_db_time(reconciliation.at)),
        )
        .filter(company::Column::Id.eq(expected.company_id.as_str()))
        .filter(
            company::Column::SubscriptionStatus
                .is_in(status_spellings(expected.status).iter().copied()),
        )
        .filter(company::Column::SubscriptionPlan.eq(expected.plan_id.as_str()))
        .filter(company::Column::BillingCycle.eq(expected.billing_cycle.as_str()))
        .filter(date_matches(
            company::Column::SubscriptionEndDate,
            expected.subscription_end_date,
        ))
        .filter(date_matches(
            company::Column::TrialEndDate,
            expected.trial_end_date,
        )))
}

async fn find_active(
    conn: &impl ConnectionTrait,
    company_id: &str,
) -> Result<Vec<subscription::Model>> {
    Ok(subscription::Entity::find()
        .filter(subscription::Column::CompanyId.eq(company_id))
        .filter(subscription::Column::Status.eq(RecordStatus::Active.as_str()))
        .order_by_asc(subscription::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn upsert_company(
    conn: &impl ConnectionTrait,
    company: &CompanySubscription,
    now: DateTimeWithTimeZone,
) -> Result<()> {
    company::Entity::insert(company_to_active_model(company, now)?)
        .on_conflict(
            OnConflict::column(company::Column::Id)
                .update_columns([
                    company::Column::SubscriptionPlan,
                    company::Column::SubscriptionStatus,
                    company::Column::BillingCycle,
                    company::Column::SubscriptionStartDate,
                    company::Column::SubscriptionEndDate,
                    company::Column::TrialEndDate,
                    company::Column::Features,
                    company::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await?;
    Ok(())
}

// =============================================================================
// SeaOrmPolicyStore
// =============================================================================

/// SeaORM-backed store implementing [`SubscriptionStore`] and [`UsageSource`].
///
/// Plan changes and cancellations run in a transaction that first locks the
/// company row, so that a company never has two active history records.
/// Status reconciliation is a single conditional `UPDATE` that matches the
/// projection it was derived from.
#[derive(Clone, Debug)]
pub struct SeaOrmPolicyStore {
    db: DatabaseConnection,
}

impl SeaOrmPolicyStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl SubscriptionStore for SeaOrmPolicyStore {
    async fn get_company(&self, company_id: &str) -> Result<Option<CompanySubscription>> {
        tracing::debug!(company_id = %company_id, "fetching company subscription");

        company::Entity::find_by_id(company_id)
            .one(&self.db)
            .await?
            .map(model_to_company)
            .transpose()
    }

    async fn save_company(&self, company: &CompanySubscription) -> Result<()> {
        tracing::debug!(
            company_id = %company.company_id,
            plan = %company.plan_id,
            status = %company.status,
            "saving company subscription"
        );

        upsert_company(&self.db, company, Utc::now().fixed_offset()).await
    }

    async fn reconcile_projection(&self, reconciliation: &Reconciliation) -> Result<bool> {
        let expected = &reconciliation.expected;
        let company_id = expected.company_id.as_str();
        tracing::debug!(
            company_id = %company_id,
            status = %reconciliation.status,
            "reconciling projection"
        );

        let result = reconcile_update(reconciliation)?.exec(&self.db).await?;

        if result.rows_affected > 0 {
            return Ok(true);
        }
        if company::Entity::find_by_id(company_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(PolicyError::company_not_found(company_id));
        }
        Ok(false)
    }

    async fn apply_plan_change(&self, change: &PlanChange) -> Result<Option<SubscriptionRecord>> {
        let company_id = &change.record.company_id;
        tracing::debug!(
            company_id = %company_id,
            plan = %change.record.plan_id,
            "applying plan change"
        );

        let txn = self.db.begin().await?;
        lock_company(&txn, company_id).await?;

        let mut superseded = None;
        for model in find_active(&txn, company_id).await? {
            let mut record = model_to_record(model)?;
            record.cancel(
                &change.record.created_by,
                Some(&change.superseded_reason),
                change.record.created_at,
            );
            save_cancelled(&txn, &record).await?;
            superseded = Some(record);
        }

        subscription::Entity::insert(record_to_active_model(&change.record)?)
            .exec(&txn)
            .await?;
        upsert_company(&txn, &change.projection, to_db_time(change.record.created_at)).await?;

        txn.commit().await?;
        Ok(superseded)
    }

    async fn cancel_active(
        &self,
        cancellation: &Cancellation,
    ) -> Result<Option<SubscriptionRecord>> {
        tracing::debug!(company_id = %cancellation.company_id, "cancelling active subscription");

        let txn = self.db.begin().await?;
        lock_company(&txn, &cancellation.company_id).await?;

        let Some(model) = find_active(&txn, &cancellation.company_id)
            .await?
            .into_iter()
            .next()
        else {
            txn.rollback().await?;
            return Ok(None);
        };

        let mut record = model_to_record(model)?;
        record.cancel(
            &cancellation.actor_id,
            cancellation.reason.as_deref(),
            cancellation.at,
        );
        save_cancelled(&txn, &record).await?;

        company::Entity::update_many()
            .col_expr(
                company::Column::SubscriptionStatus,
                Expr::value(SubscriptionStatus::Cancelled.as_str()),
            )
            .col_expr(company::Column::UpdatedAt, Expr::value(to_db_time(cancellation.at)))
            .filter(company::Column::Id.eq(cancellation.company_id.as_str()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(Some(record))
    }

    async fn get_active_record(&self, company_id: &str) -> Result<Option<SubscriptionRecord>> {
        find_active(&self.db, company_id)
            .await?
            .into_iter()
            .next()
            .map(model_to_record)
            .transpose()
    }

    async fn list_history(&self, company_id: &str) -> Result<Vec<SubscriptionRecord>> {
        subscription::Entity::find()
            .filter(subscription::Column::CompanyId.eq(company_id))
            .order_by_asc(subscription::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(model_to_record)
            .collect()
    }
}

#[async_trait]
impl UsageSource for SeaOrmPolicyStore {
    async fn count_active_packages(&self, company_id: &str) -> Result<u64> {
        Ok(package::Entity::find()
            .filter(package::Column::CompanyId.eq(company_id))
            .filter(package::Column::IsActive.eq(true))
            .count(&self.db)
            .await?)
    }

    async fn count_bookings_since(&self, company_id: &str, since: DateTime<Utc>) -> Result<u64> {
        Ok(order::Entity::find()
            .filter(order::Column::CompanyId.eq(company_id))
            .filter(order::Column::CreatedAt.gte(to_db_time(since)))
            .count(&self.db)
            .await?)
    }

    async fn count_package_photos(
        &self,
        company_id: &str,
        package_id: &str,
    ) -> Result<Option<u64>> {
        Ok(package::Entity::find_by_id(package_id)
            .filter(package::Column::CompanyId.eq(company_id))
            .one(&self.db)
            .await?
            .map(|p| i32_to_u64(p.photo_count)))
    }

    async fn max_photos_per_package(&self, company_id: &str) -> Result<u64> {
        let max: Option<Option<i32>> = package::Entity::find()
            .select_only()
            .column_as(package::Column::PhotoCount.max(), "max_photos")
            .filter(package::Column::CompanyId.eq(company_id))
            .into_tuple()
            .one(&self.db)
            .await?;
        Ok(max.flatten().map(i32_to_u64).unwrap_or(0))
    }

    async fn count_documents(&self, company_id: &str) -> Result<u64> {
        Ok(company_document::Entity::find()
            .filter(company_document::Column::CompanyId.eq(company_id))
            .count(&self.db)
            .await?)
    }

    async fn count_staff_accounts(&self, company_id: &str) -> Result<u64> {
        Ok(staff_account::Entity::find()
            .filter(staff_account::Column::CompanyId.eq(company_id))
            .count(&self.db)
            .await?)
    }
}
