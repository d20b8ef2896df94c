use chrono::{NaiveDate, Utc};

use claimlens_db::{DemoDataset, SeedResult};

use crate::commands::{open_database, prepare, CommandResult, StepError};

pub fn run(as_of: Option<NaiveDate>) -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());

    let result = runtime.block_on(async {
        let dataset = DemoDataset::build(as_of)
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let pool = open_database(&config).await?;

        let seeded = dataset
            .load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = dataset
            .verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed), 6u8));
        }
        Ok::<SeedResult, StepError>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(step) => CommandResult::from_step("seed", step),
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset anchored at {}: {} departments, {} employees, {} claims, {} approval events ({} new); try `claimlens insights {}`",
        seeded.as_of,
        DemoDataset::DEPARTMENTS.len(),
        seeded.employees,
        seeded.claims,
        seeded.events,
        seeded.events_appended,
        seeded.subject_claim_id,
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_message(&["claim:CLM-1004", "events:CLM-1004"]),
            "Seed verification failed for checks: claim:CLM-1004, events:CLM-1004"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
