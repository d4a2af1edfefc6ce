mod bridge;
mod executer;
mod generator;
mod judge;
mod problem;
mod profiles;
mod runner;
mod sandbox;

use anyhow::Result;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::executer::TrustedExecuter;
use crate::generator::{process_generate_job, GenerateJob, GenerateResult};
use crate::problem::Problem;
use crate::runner::{run_tests, RunReport, RunStatus};

/// Worker job enum - represents different types of jobs the worker can process
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum WorkerJob {
    /// Judge a candidate submission
    #[serde(rename = "judge")]
    Judge(JudgeJob),
    /// Run a test-case generator for admin tooling
    #[serde(rename = "generate")]
    Generate(GenerateJob),
}

/// Job received from the Redis queue
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeJob {
    pub submission_id: i64,
    /// Candidate source; must define the problem's function
    pub code: String,
    /// The full problem definition travels inline on the job
    pub problem: Problem,
}

/// Result of judging a submission
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    pub submission_id: i64,
    #[serde(flatten)]
    pub report: RunReport,
}

const QUEUE_NAME: &str = "judge:queue";
const RESULT_CHANNEL: &str = "judge:results";
const RESULT_KEY_PREFIX: &str = "judge:result:";
const GENERATE_CHANNEL: &str = "judge:generated";
const GENERATE_KEY_PREFIX: &str = "judge:generate:";

/// Stored results expire after an hour; the web app polls well within that
const RESULT_TTL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dojo_judge=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    // Load execution profiles
    let profiles_path = std::env::var("PROFILES_CONFIG").ok();
    profiles::init_profiles(profiles_path.as_deref())?;
    match &profiles_path {
        Some(path) => info!("Loaded execution profiles from {}", path),
        None => info!("Loaded built-in execution profiles"),
    }

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());

    info!("Starting Judge Worker...");

    let client = redis::Client::open(redis_url.clone())?;
    let mut conn = get_redis_connection(&client).await?;
    info!("Connected to Redis at {}", redis_url);

    let trusted = TrustedExecuter::default();

    info!("Waiting for jobs...");

    loop {
        // Block and wait for a job from the queue (BLPOP)
        let result: Option<(String, String)> = match conn.blpop(QUEUE_NAME, 0.0).await {
            Ok(res) => res,
            Err(e) => {
                warn!("Redis BLPOP failed: {}. Attempting to reconnect...", e);
                conn = get_redis_connection(&client).await?;
                continue;
            }
        };

        if let Some((_, job_data)) = result {
            match serde_json::from_str::<WorkerJob>(&job_data) {
                Ok(worker_job) => match worker_job {
                    WorkerJob::Judge(job) => {
                        info!(
                            "Received judge job: submission_id={}, problem_id={}, cases={}",
                            job.submission_id,
                            job.problem.id,
                            job.problem.tests.len()
                        );

                        match run_tests(&job.problem, &job.code).await {
                            Ok(report) => {
                                let result = JudgeResult {
                                    submission_id: job.submission_id,
                                    report,
                                };
                                if let Err(e) = store_judge_result(&mut conn, &client, &result).await
                                {
                                    error!("Failed to store judge result: {}", e);
                                }
                                info!(
                                    "Judge job completed: submission_id={}, status={}, passed={}/{}",
                                    result.submission_id,
                                    result.report.status,
                                    result.report.results.iter().filter(|r| r.passed).count(),
                                    result.report.results.len()
                                );
                            }
                            Err(e) => {
                                error!("Failed to process judge job {}: {}", job.submission_id, e);
                                let error_result = JudgeResult {
                                    submission_id: job.submission_id,
                                    report: RunReport {
                                        status: RunStatus::Error,
                                        results: vec![],
                                        message: Some(format!("{:#}", e)),
                                    },
                                };
                                if let Err(e) =
                                    store_judge_result(&mut conn, &client, &error_result).await
                                {
                                    error!("Failed to store judge error result: {}", e);
                                }
                            }
                        }
                    }
                    WorkerJob::Generate(job) => {
                        info!(
                            "Received generate job: problem_id={}, generator_bytes={}",
                            job.problem_id,
                            job.generator_code.len()
                        );

                        match process_generate_job(&job, &trusted).await {
                            Ok(result) => {
                                if let Err(e) =
                                    store_generate_result(&mut conn, &client, &result).await
                                {
                                    error!(
                                        "Failed to store generate result for problem {}: {}",
                                        result.problem_id, e
                                    );
                                }
                                info!(
                                    "Generate job completed: problem_id={}, success={}, cases={}",
                                    result.problem_id,
                                    result.success,
                                    result.cases.len()
                                );
                            }
                            Err(e) => {
                                error!(
                                    "Failed to process generate job for problem {}: {}",
                                    job.problem_id, e
                                );
                                let error_result = GenerateResult {
                                    problem_id: job.problem_id,
                                    success: false,
                                    cases: vec![],
                                    truncated: false,
                                    error_message: Some(format!("{:#}", e)),
                                };
                                if let Err(e) =
                                    store_generate_result(&mut conn, &client, &error_result).await
                                {
                                    error!(
                                        "Failed to store generate error result for problem {}: {}",
                                        job.problem_id, e
                                    );
                                }
                            }
                        }
                    }
                },
                Err(e) => {
                    warn!("Failed to parse job data: {}", e);
                }
            }
        }
    }
}

/// Store a judge result in Redis for polling, then publish it
async fn store_judge_result(
    conn: &mut MultiplexedConnection,
    client: &redis::Client,
    result: &JudgeResult,
) -> Result<()> {
    let result_json = serde_json::to_string(result)?;
    let result_key = format!("{}{}", RESULT_KEY_PREFIX, result.submission_id);
    store_result(conn, client, &result_key, RESULT_CHANNEL, &result_json).await
}

/// Store a generation result in Redis for polling, then publish it
async fn store_generate_result(
    conn: &mut MultiplexedConnection,
    client: &redis::Client,
    result: &GenerateResult,
) -> Result<()> {
    let result_json = serde_json::to_string(result)?;
    let result_key = format!("{}{}", GENERATE_KEY_PREFIX, result.problem_id);
    store_result(conn, client, &result_key, GENERATE_CHANNEL, &result_json).await
}

async fn store_result(
    conn: &mut MultiplexedConnection,
    client: &redis::Client,
    key: &str,
    channel: &str,
    payload: &str,
) -> Result<()> {
    // Store result in Redis for polling (expires in 1 hour)
    if let Err(e) = conn.set_ex::<_, _, ()>(key, payload, RESULT_TTL_SECS).await {
        warn!("Redis set_ex failed: {}. Reconnecting and retrying...", e);
        let mut new_conn = get_redis_connection(client).await?;
        new_conn.set_ex::<_, _, ()>(key, payload, RESULT_TTL_SECS).await?;
        *conn = new_conn;
    }

    // Also publish to the channel (for real-time updates if subscribed)
    if let Err(e) = conn.publish::<_, _, ()>(channel, payload).await {
        warn!("Redis publish failed: {}. Reconnecting and retrying...", e);
        let mut new_conn = get_redis_connection(client).await?;
        new_conn.publish::<_, _, ()>(channel, payload).await?;
        *conn = new_conn;
    }

    Ok(())
}

async fn get_redis_connection(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in 3 seconds...",
                    e
                );
                sleep(Duration::from_secs(3)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_job_tag_dispatch() {
        let job: WorkerJob = serde_json::from_value(json!({
            "job_type": "judge",
            "submissionId": 77,
            "code": "function f() {}",
            "problem": {
                "id": 1,
                "functionName": "f",
                "parameters": [],
                "returnType": "number",
                "tests": []
            }
        }))
        .unwrap();
        match job {
            WorkerJob::Judge(job) => {
                assert_eq!(job.submission_id, 77);
                assert_eq!(job.problem.function_name, "f");
            }
            other => panic!("unexpected job: {:?}", other),
        }

        let job: WorkerJob = serde_json::from_value(json!({
            "job_type": "generate",
            "problemId": 3,
            "generatorCode": "function generateTestCases() { return []; }",
            "passingCode": "function f() {}",
            "problem": {
                "id": 3,
                "functionName": "f",
                "parameters": [],
                "returnType": "number"
            }
        }))
        .unwrap();
        assert!(matches!(job, WorkerJob::Generate(_)));

        let bad = serde_json::from_value::<WorkerJob>(json!({ "job_type": "unknown" }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_judge_result_flattens_report() {
        let result = JudgeResult {
            submission_id: 5,
            report: RunReport {
                status: RunStatus::Error,
                results: vec![],
                message: Some("SyntaxError: unexpected token".to_string()),
            },
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["submissionId"], json!(5));
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["results"], json!([]));
        assert_eq!(value["message"], json!("SyntaxError: unexpected token"));
    }
}
