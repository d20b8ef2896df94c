use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;

use claimlens_analytics::{AnalyticsRepositories, AnalyticsService};
use claimlens_core::envelope::ResultEnvelope;

use crate::commands::{open_database, prepare, CommandResult, StepError};

pub fn similar(claim_id: &str) -> CommandResult {
    execute("similar", None, |service| async move {
        service.get_similar_claims_analysis(claim_id).await
    })
}

pub fn insights(claim_id: &str) -> CommandResult {
    execute("insights", None, |service| async move { service.get_claim_insights(claim_id).await })
}

pub fn history(claim_id: &str) -> CommandResult {
    execute("history", None, |service| async move { service.get_claim_history(claim_id).await })
}

pub fn department(name: &str, as_of: Option<NaiveDate>) -> CommandResult {
    execute("department", as_of, |service| async move { service.get_department_data(name).await })
}

pub fn trends(name: &str, months: Option<u32>, as_of: Option<NaiveDate>) -> CommandResult {
    execute("trends", as_of, |service| async move {
        service.get_department_trends(name, months).await
    })
}

pub fn compare(names: &[String], as_of: Option<NaiveDate>) -> CommandResult {
    execute("compare", as_of, |service| async move { service.compare_departments(names).await })
}

pub fn employee(employee_id: &str, months: Option<u32>, as_of: Option<NaiveDate>) -> CommandResult {
    execute("employee", as_of, |service| async move {
        service.get_employee_rollup(employee_id, months).await
    })
}

/// Opens the configured database, runs one analytics call and prints its envelope.
fn execute<T, F, Fut>(command: &str, as_of: Option<NaiveDate>, call: F) -> CommandResult
where
    T: Serialize,
    F: FnOnce(AnalyticsService) -> Fut,
    Fut: Future<Output = ResultEnvelope<T>>,
{
    let (config, runtime) = match prepare(command) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let mut service =
            AnalyticsService::new(AnalyticsRepositories::sql(pool.clone()), config.analytics.clone());
        if let Some(as_of) = as_of {
            service = service.with_as_of(as_of);
        }

        let envelope = call(service).await;
        pool.close().await;
        Ok::<ResultEnvelope<T>, StepError>(envelope)
    });

    match result {
        Ok(envelope) => CommandResult::envelope(command, &envelope),
        Err(step) => CommandResult::from_step(command, step),
    }
}
