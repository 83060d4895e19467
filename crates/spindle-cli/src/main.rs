use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spindle_core::domain::ExecOutcome;
use spindle_core::error::SpindleError;
use spindle_core::pool::{Pool, PoolConfig};
use spindle_core::store::StoreConfig;

/// Schema owned by the application, not by the pool; the pool just runs
/// whatever statements it is handed.
const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, username TEXT UNIQUE, password TEXT, role TEXT, first_name TEXT, last_name TEXT, email TEXT, job_tag TEXT)",
    "CREATE TABLE IF NOT EXISTS jobs (id INTEGER PRIMARY KEY, employer_id INTEGER, name TEXT, salary INTEGER, description TEXT, tag TEXT)",
    "CREATE TABLE IF NOT EXISTS subscriptions (worker_id INTEGER, job_id INTEGER, PRIMARY KEY(worker_id, job_id))",
    "CREATE TABLE IF NOT EXISTS tokens (user_id INTEGER, token TEXT, PRIMARY KEY(user_id, token))",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) プールを起動（ワーカー2本、jobs.db を共有）
    let pool = Pool::spawn(PoolConfig::new(StoreConfig::new("jobs.db")));

    // (B) テーブル初期化（呼び出し側の責務）
    for sql in SCHEMA {
        pool.submit(sql, vec![]).await?;
    }
    info!("database tables initialized");

    // (C) ミューテーション → クエリ
    let registered = pool
        .submit(
            "INSERT INTO users (username, password, role) VALUES (?, ?, ?)",
            vec![json!("amina"), json!("$2b$10$hash"), json!("employer")],
        )
        .await;
    match registered {
        Ok(ExecOutcome::Mutation { last_insert_id, .. }) => {
            info!(user_id = last_insert_id, "user registered");
        }
        // 同じ username で再実行すると UNIQUE 制約に当たる。プールは落ちない。
        Err(SpindleError::Statement(message)) => info!(%message, "user already exists"),
        other => println!("unexpected outcome: {other:?}"),
    }

    let created = pool
        .submit(
            "INSERT INTO jobs (employer_id, name, salary, description, tag) VALUES (?, ?, ?, ?, ?)",
            vec![
                json!(1),
                json!("carpenter"),
                json!(52_000),
                json!("Framing crew, full time"),
                json!("trade"),
            ],
        )
        .await?;
    if let ExecOutcome::Mutation { last_insert_id, .. } = created {
        println!("created job {last_insert_id}");
    }

    let jobs = pool.submit("SELECT id, name, salary FROM jobs", vec![]).await?;
    if let ExecOutcome::Rows(rows) = jobs {
        for row in rows {
            println!("{}", serde_json::to_string(&row)?);
        }
    }

    // (D) graceful shutdown — ワーカーの接続を閉じてから終了
    pool.shutdown_and_join().await;
    Ok(())
}
