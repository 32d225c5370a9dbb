use super::model::{Companion, CompanionSessionSummary, SessionRecord};
use super::store::{CompanionCatalog, SessionQuery, SessionStore, StoreError};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Most recent record per companion.
///
/// Picks the maximum `created_at`; on equal timestamps the first row seen wins.
pub fn latest_by_companion(rows: &[SessionRecord]) -> HashMap<&str, &SessionRecord> {
    let mut latest: HashMap<&str, &SessionRecord> = HashMap::new();

    for row in rows {
        latest
            .entry(row.companion_id.as_str())
            .and_modify(|current| {
                if row.created_at > current.created_at {
                    *current = row;
                }
            })
            .or_insert(row);
    }

    latest
}

/// Attach the user's latest session outcome to each companion.
///
/// Without a user, or when the session query fails, every companion gets
/// empty session fields. Output order follows `companions`.
pub async fn enrich(
    store: &dyn SessionStore,
    companions: Vec<Companion>,
    user_id: Option<&str>,
) -> Vec<CompanionSessionSummary> {
    let Some(user_id) = user_id else {
        debug!("No user signed in, companions get empty session data");
        return companions.into_iter().map(CompanionSessionSummary::empty).collect();
    };

    if companions.is_empty() {
        return Vec::new();
    }

    let ids = companions.iter().map(|c| c.id.clone()).collect();
    let query = SessionQuery::for_user(user_id).companions(ids);

    let rows = match store.select_sessions(&query).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error fetching session data for enrichment: {}", e);
            return companions.into_iter().map(CompanionSessionSummary::empty).collect();
        }
    };

    let latest = latest_by_companion(&rows);

    companions
        .into_iter()
        .map(|companion| {
            let record = latest.get(companion.id.as_str()).copied();
            CompanionSessionSummary::from_latest(companion, record)
        })
        .collect()
}

/// Companions the user talked to most recently, each with its latest session.
///
/// Looks at the user's `limit` newest sessions. When there are none (or the
/// query fails) the first `limit` catalog companions are returned with empty
/// session fields. Unauthenticated callers get an empty list.
pub async fn recent_sessions(
    store: &dyn SessionStore,
    catalog: &dyn CompanionCatalog,
    user_id: Option<&str>,
    limit: usize,
) -> Result<Vec<CompanionSessionSummary>, StoreError> {
    let Some(user_id) = user_id else {
        return Ok(Vec::new());
    };

    let rows = match store
        .select_sessions(&SessionQuery::for_user(user_id).limit(limit))
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("Session history error, falling back to catalog: {}", e);
            Vec::new()
        }
    };

    if rows.is_empty() {
        let companions = catalog.list_companions(limit).await?;
        return Ok(companions.into_iter().map(CompanionSessionSummary::empty).collect());
    }

    let latest = latest_by_companion(&rows);
    let mut seen = Vec::new();
    let mut summaries = Vec::new();

    for row in &rows {
        if seen.contains(&row.companion_id.as_str()) {
            continue;
        }
        seen.push(row.companion_id.as_str());

        match catalog.get_companion(&row.companion_id).await? {
            Some(companion) => {
                let record = latest.get(row.companion_id.as_str()).copied();
                summaries.push(CompanionSessionSummary::from_latest(companion, record));
            }
            None => warn!("Session {} references unknown companion {}", row.id, row.companion_id),
        }
    }

    Ok(summaries)
}
