use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "chronicler".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "chronicler".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Chronicles
        "DEFINE TABLE IF NOT EXISTS chronicle SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS title ON TABLE chronicle TYPE string;
         DEFINE FIELD IF NOT EXISTS description ON TABLE chronicle TYPE string;
         DEFINE FIELD IF NOT EXISTS language ON TABLE chronicle TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE chronicle TYPE datetime DEFAULT time::now();",

        // Uploaded media files, owned by a chronicle
        "DEFINE TABLE IF NOT EXISTS file SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS chronicle_id ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS mime ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS path ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS url ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS thumb_name ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS thumb_path ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS thumb_url ON TABLE file TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE file TYPE datetime DEFAULT time::now();",

        // Generated compositions. `data` is only set once `status` is ready.
        "DEFINE TABLE IF NOT EXISTS composition SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS chronicle_id ON TABLE composition TYPE string;
         DEFINE FIELD IF NOT EXISTS title ON TABLE composition TYPE string;
         DEFINE FIELD IF NOT EXISTS version ON TABLE composition TYPE int;
         DEFINE FIELD IF NOT EXISTS status ON TABLE composition TYPE string
             ASSERT $value INSIDE ['pending', 'ready', 'failed'];
         DEFINE FIELD IF NOT EXISTS data ON TABLE composition TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS error ON TABLE composition TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE composition TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS completed_at ON TABLE composition TYPE option<datetime>;",

        // Indexes for performance
        "DEFINE INDEX IF NOT EXISTS file_chronicle ON TABLE file COLUMNS chronicle_id;
         DEFINE INDEX IF NOT EXISTS composition_chronicle ON TABLE composition COLUMNS chronicle_id;
         DEFINE INDEX IF NOT EXISTS composition_status ON TABLE composition COLUMNS status;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
