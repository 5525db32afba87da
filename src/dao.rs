use anyhow::Result;
use sqlx::AnyPool;

use crate::storage::HistoryRecord;

#[derive(Debug, Clone)]
pub struct HistoryInsert {
    pub site_name: String,
    pub url: String,
    pub title: String,
}

pub async fn history_exists(pool: &AnyPool, url: &str) -> Result<bool> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history WHERE url = ?")
        .bind(url)
        .fetch_one(pool)
        .await?;
    Ok(n > 0)
}

/// Insert a history row; an existing url is left untouched.
pub async fn insert_history(pool: &AnyPool, h: &HistoryInsert) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO history(site_name, url, title) VALUES(?, ?, ?) \
         ON CONFLICT(url) DO NOTHING",
    )
    .bind(&h.site_name)
    .bind(&h.url)
    .bind(&h.title)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn count_history(pool: &AnyPool, site_name: Option<&str>) -> Result<i64> {
    let n = match site_name {
        Some(site) => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history WHERE site_name = ?")
                .bind(site)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
                .fetch_one(pool)
                .await?
        }
    };
    Ok(n)
}

/// Most recent records first.
pub async fn recent_history(
    pool: &AnyPool,
    site_name: Option<&str>,
    limit: i64,
) -> Result<Vec<HistoryRecord>> {
    let rows = match site_name {
        Some(site) => {
            sqlx::query_as::<_, (String, String, String, Option<String>)>(
                "SELECT site_name, url, title, CAST(timestamp AS TEXT) FROM history \
                 WHERE site_name = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(site)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, (String, String, String, Option<String>)>(
                "SELECT site_name, url, title, CAST(timestamp AS TEXT) FROM history \
                 ORDER BY id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows
        .into_iter()
        .map(|(site_name, url, title, timestamp)| HistoryRecord {
            site_name,
            url,
            title,
            timestamp,
        })
        .collect())
}
