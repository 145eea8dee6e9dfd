use crate::consent::{ConsentEngine, SweepReport};
use crate::entities;
use crate::errors::LodestarError;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub const SWEEP_JOB: &str = "sweep_stale_consents";

/// Initialize and start the job scheduler with the consent sweep.
///
/// Runs are recorded in `job_executions` when a database is given.
pub async fn init_scheduler(
    engine: ConsentEngine,
    db: Option<DatabaseConnection>,
    schedule: &str,
) -> Result<JobScheduler, LodestarError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| LodestarError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let sweep_job = Job::new_async(schedule, move |_uuid, _l| {
        let engine = engine.clone();
        let db = db.clone();
        Box::pin(async move {
            info!("Running {} job", SWEEP_JOB);
            // Failures are already logged and recorded
            let _ = run_sweep(&engine, db.as_ref()).await;
        })
    })
    .map_err(|e| LodestarError::Other(format!("Failed to create sweep job: {}", e)))?;

    sched
        .add(sweep_job)
        .await
        .map_err(|e| LodestarError::Other(format!("Failed to add sweep job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| LodestarError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!(schedule, "Job scheduler started");

    Ok(sched)
}

/// One sweep, bracketed by a `job_executions` row when `db` is set.
pub async fn run_sweep(
    engine: &ConsentEngine,
    db: Option<&DatabaseConnection>,
) -> Result<SweepReport, LodestarError> {
    let execution_id = match db {
        Some(db) => start_job_execution(db, SWEEP_JOB, engine.now()).await.ok(),
        None => None,
    };

    let result = engine.sweep().await;

    match result {
        Ok(report) => {
            info!(
                examined = report.examined,
                rejected = report.rejected,
                failed = report.failed,
                "Swept stale consents"
            );
            if let (Some(db), Some(id)) = (db, execution_id) {
                let _ = complete_job_execution(
                    db,
                    id,
                    engine.now(),
                    report.failed == 0,
                    None,
                    Some(report.rejected as i64),
                )
                .await;
            }
            Ok(report)
        }
        Err(e) => {
            error!("Failed to sweep stale consents: {}", e);
            if let (Some(db), Some(id)) = (db, execution_id) {
                let _ = complete_job_execution(
                    db,
                    id,
                    engine.now(),
                    false,
                    Some(e.to_string()),
                    None,
                )
                .await;
            }
            Err(LodestarError::Other(e.to_string()))
        }
    }
}

/// Record the start of a job execution at `now`
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
    now: DateTime<Utc>,
) -> Result<i64, LodestarError> {
    use entities::job_execution;

    let now = now.timestamp();

    let execution = job_execution::ActiveModel {
        job_name: Set(job_name.to_string()),
        started_at: Set(now),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        consents_rejected: Set(None),
        ..Default::default()
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution at `now`
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    now: DateTime<Utc>,
    success: bool,
    error_message: Option<String>,
    consents_rejected: Option<i64>,
) -> Result<(), LodestarError> {
    use entities::job_execution::{Column, Entity};

    let now = now.timestamp();

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.consents_rejected = Set(consents_rejected);
        active.update(db).await?;
    }

    Ok(())
}

/// Manually trigger a job by name
pub async fn trigger_job_manually(
    engine: &ConsentEngine,
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<SweepReport, LodestarError> {
    info!("Manually triggering job: {}", job_name);
    match job_name {
        SWEEP_JOB => run_sweep(engine, Some(db)).await,
        _ => Err(LodestarError::Other(format!("Unknown job name: {}", job_name))),
    }
}
