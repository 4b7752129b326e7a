//! Sqlite-backed [`DbConnector`].

use crate::connector::DbConnector;
use crate::schema;
use async_trait::async_trait;
use coordinator_core::{Change, Error, NewBuildset, NewChange, ObjectId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Translate a `db_url` in the SQLAlchemy convention buildbot inherited
/// (`sqlite:///relative.db` is relative, `sqlite:////abs/path.db` is
/// absolute) into a filesystem path, relative to `basedir` when relative.
pub fn sqlite_path(db_url: &str, basedir: &Path) -> Result<PathBuf, Error> {
    let rest = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| Error::ConfigSyntax(format!("not a sqlite db_url: {db_url}")))?;
    if rest == ":memory:" {
        return Ok(PathBuf::from(":memory:"));
    }
    if let Some(abs) = rest.strip_prefix('/') {
        // `rest` started with one `/` (the fourth slash overall) => absolute.
        Ok(PathBuf::from("/").join(abs))
    } else {
        Ok(basedir.join(rest))
    }
}

/// A [`DbConnector`] backed by sqlite via `sqlx`.
pub struct SqliteConnector {
    pool: SqlitePool,
}

impl SqliteConnector {
    /// Open (creating if necessary) the sqlite database at `path`.
    pub async fn open(path: &Path) -> Result<Self, Error> {
        let opts = if path == Path::new(":memory:") {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| Error::TransientDb(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(path).create_if_missing(true)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(SqliteConnector { pool })
    }
}

#[async_trait]
impl DbConnector for SqliteConnector {
    async fn start(&self) -> Result<(), Error> {
        for ddl in [
            schema::CREATE_CHANGES,
            schema::CREATE_BUILDSETS,
            schema::CREATE_OBJECT_STATE,
            schema::CREATE_STATE,
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::TransientDb(e.to_string()))?;
        }
        let current: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        if current == 0 {
            sqlx::query(&format!("PRAGMA user_version = {}", schema::SCHEMA_VERSION))
                .execute(&self.pool)
                .await
                .map_err(|e| Error::TransientDb(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_current(&self) -> Result<bool, Error> {
        let current: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(current == schema::SCHEMA_VERSION)
    }

    async fn insert_change(&self, change: NewChange) -> Result<Change, Error> {
        let properties = serde_json::to_string(&change.properties).map_err(|e| Error::TransientDb(e.to_string()))?;
        let files = serde_json::to_string(&change.files).map_err(|e| Error::TransientDb(e.to_string()))?;
        let rec = sqlx::query(
            "INSERT INTO changes (who, comments, branch, revision, category, properties, files, \"when\")
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&change.who)
        .bind(&change.comments)
        .bind(&change.branch)
        .bind(&change.revision)
        .bind(&change.category)
        .bind(&properties)
        .bind(&files)
        .bind(change.when)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(Change {
            changeid: rec.last_insert_rowid(),
            who: change.who,
            comments: change.comments,
            branch: change.branch,
            revision: change.revision,
            category: change.category,
            properties: change.properties,
            files: change.files,
            when: change.when,
        })
    }

    async fn get_change(&self, changeid: i64) -> Result<Option<Change>, Error> {
        let row = sqlx::query(
            "SELECT changeid, who, comments, branch, revision, category, properties, files, \"when\"
             FROM changes WHERE changeid = ?",
        )
        .bind(changeid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::TransientDb(e.to_string()))?;
        let Some(row) = row else { return Ok(None) };
        let properties_raw: String = row.try_get("properties").map_err(|e| Error::TransientDb(e.to_string()))?;
        let files_raw: String = row.try_get("files").map_err(|e| Error::TransientDb(e.to_string()))?;
        let properties: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&properties_raw).map_err(|e| Error::TransientDb(e.to_string()))?;
        let files: Vec<String> = serde_json::from_str(&files_raw).map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(Some(Change {
            changeid: row.try_get("changeid").map_err(|e| Error::TransientDb(e.to_string()))?,
            who: row.try_get("who").map_err(|e| Error::TransientDb(e.to_string()))?,
            comments: row.try_get("comments").map_err(|e| Error::TransientDb(e.to_string()))?,
            branch: row.try_get("branch").map_err(|e| Error::TransientDb(e.to_string()))?,
            revision: row.try_get("revision").map_err(|e| Error::TransientDb(e.to_string()))?,
            category: row.try_get("category").map_err(|e| Error::TransientDb(e.to_string()))?,
            properties,
            files,
            when: row.try_get("when").map_err(|e| Error::TransientDb(e.to_string()))?,
        }))
    }

    async fn latest_changeid(&self) -> Result<Option<i64>, Error> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(changeid) FROM changes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(max)
    }

    async fn insert_buildset(&self, buildset: NewBuildset) -> Result<i64, Error> {
        let builder_names =
            serde_json::to_string(&buildset.builder_names).map_err(|e| Error::TransientDb(e.to_string()))?;
        let properties =
            serde_json::to_string(&buildset.properties).map_err(|e| Error::TransientDb(e.to_string()))?;
        let rec = sqlx::query(
            "INSERT INTO buildsets (reason, builder_names, properties, external_idstring) VALUES (?, ?, ?, ?)",
        )
        .bind(&buildset.reason)
        .bind(&builder_names)
        .bind(&properties)
        .bind(&buildset.external_idstring)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(rec.last_insert_rowid())
    }

    async fn get_object_id(&self, class_tag: &str, qualified_name: &str) -> Result<ObjectId, Error> {
        if let Some(id) = sqlx::query_scalar::<_, i64>(
            "SELECT objectid FROM objects WHERE class_tag = ? AND qualified_name = ?",
        )
        .bind(class_tag)
        .bind(qualified_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::TransientDb(e.to_string()))?
        {
            return Ok(ObjectId(id));
        }
        // Racing inserts from peer masters are resolved by the UNIQUE constraint:
        // on conflict, re-read rather than erroring.
        let inserted = sqlx::query("INSERT OR IGNORE INTO objects (class_tag, qualified_name) VALUES (?, ?)")
            .bind(class_tag)
            .bind(qualified_name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        if inserted.rows_affected() == 1 {
            return Ok(ObjectId(inserted.last_insert_rowid()));
        }
        let id: i64 = sqlx::query_scalar("SELECT objectid FROM objects WHERE class_tag = ? AND qualified_name = ?")
            .bind(class_tag)
            .bind(qualified_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(ObjectId(id))
    }

    async fn get_state(&self, objectid: ObjectId, name: &str) -> Result<Option<serde_json::Value>, Error> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM object_state WHERE objectid = ? AND name = ?")
            .bind(objectid.0)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::TransientDb(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(|e| Error::TransientDb(e.to_string()))?,
            )),
        }
    }

    async fn set_state(&self, objectid: ObjectId, name: &str, value: serde_json::Value) -> Result<(), Error> {
        let raw = serde_json::to_string(&value).map_err(|e| Error::TransientDb(e.to_string()))?;
        sqlx::query(
            "INSERT INTO object_state (objectid, name, value) VALUES (?, ?, ?)
             ON CONFLICT(objectid, name) DO UPDATE SET value = excluded.value",
        )
        .bind(objectid.0)
        .bind(name)
        .bind(&raw)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::TransientDb(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_url_resolves_under_basedir() {
        let p = sqlite_path("sqlite:///state.sqlite", Path::new("/srv/master")).unwrap();
        assert_eq!(p, Path::new("/srv/master/state.sqlite"));
    }

    #[test]
    fn absolute_url_ignores_basedir() {
        let p = sqlite_path("sqlite:////var/lib/state.sqlite", Path::new("/srv/master")).unwrap();
        assert_eq!(p, Path::new("/var/lib/state.sqlite"));
    }

    #[tokio::test]
    async fn round_trips_a_change() {
        let db = SqliteConnector::open(Path::new(":memory:")).await.unwrap();
        db.start().await.unwrap();
        let change = db
            .insert_change(NewChange {
                who: "alice".into(),
                comments: "fix the thing".into(),
                when: 1_700_000_000,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(change.changeid, 1);
        let fetched = db.get_change(1).await.unwrap().unwrap();
        assert_eq!(fetched, change);
        assert_eq!(db.latest_changeid().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn object_id_is_idempotent() {
        let db = SqliteConnector::open(Path::new(":memory:")).await.unwrap();
        db.start().await.unwrap();
        let a = db.get_object_id("master", "m1").await.unwrap();
        let b = db.get_object_id("master", "m1").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn state_is_last_writer_wins() {
        let db = SqliteConnector::open(Path::new(":memory:")).await.unwrap();
        db.start().await.unwrap();
        let id = db.get_object_id("master", "m1").await.unwrap();
        db.set_state(id, "k", serde_json::json!(1)).await.unwrap();
        db.set_state(id, "k", serde_json::json!(2)).await.unwrap();
        assert_eq!(db.get_state(id, "k").await.unwrap(), Some(serde_json::json!(2)));
    }
}
