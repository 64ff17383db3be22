use chrono::{DateTime, Utc};
use encore_core::util::millis;
use encore_core::{
    AggregateRequest, EngineConfig, Outcome, RemoteGateway, RequestId, RequestRef, Song,
    SupabaseGateway, SyncOrchestrator,
};
use serde::Serialize;

use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub position: usize,
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub votes: i64,
    pub priority: i64,
    pub locked: bool,
    pub pending: bool,
    pub requesters: Vec<String>,
    pub messages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub relative_time: String,
}

/// Open a session against the backend configured for `profile`.
pub fn open_session(profile: Option<&str>) -> Result<SyncOrchestrator<SupabaseGateway>, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let backend = profile
        .backend_config()?
        .ok_or(CliError::BackendNotConfigured)?;
    let identity = profile.identity().ok_or_else(|| {
        CliError::Config(format!(
            "Profile '{profile_name}' has no voter id. Run `encore config init` or set ENCORE_VOTER_ID."
        ))
    })?;

    let engine_config = EngineConfig::default();
    let gateway = SupabaseGateway::new(backend, millis(engine_config.poll_interval_ms))?;
    tracing::debug!("Using profile '{}'", profile_name);
    Ok(SyncOrchestrator::new(gateway, engine_config, identity)?)
}

/// Turn a failed outcome into an error; print any stale-data warning.
pub fn expect_success(outcome: Outcome) -> Result<(), CliError> {
    if let Some(warning) = &outcome.warning {
        eprintln!(
            "Warning: showing cached {} ({})",
            warning.collection, warning.reason
        );
    }
    match outcome.error {
        Some(error) if !outcome.success => Err(CliError::Rejected(error)),
        _ => Ok(()),
    }
}

/// Load the queue and resolve `query` to one entry by full id or unique prefix.
pub async fn resolve_request<G: RemoteGateway>(
    engine: &SyncOrchestrator<G>,
    query: &str,
) -> Result<AggregateRequest, CliError> {
    let query = normalize_request_identifier(query)?;
    expect_success(engine.refresh(true).await)?;
    find_request(&engine.current_requests(), &query)
}

pub fn find_request(
    requests: &[AggregateRequest],
    query: &str,
) -> Result<AggregateRequest, CliError> {
    if let Ok(id) = query.parse::<RequestId>() {
        if let Some(request) = requests.iter().find(|request| request.contains(id)) {
            return Ok(request.clone());
        }
    }

    let query = query.to_ascii_lowercase();
    let matching = requests
        .iter()
        .filter(|request| {
            request
                .request_ids
                .iter()
                .any(|id| id.to_string().starts_with(&query))
        })
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::RequestNotFound(query)),
        [request] => Ok((*request).clone()),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|request| short_id(request.reference))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRequestId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_request_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRequestId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn short_id(reference: RequestRef) -> String {
    match reference {
        RequestRef::Confirmed(id) => id.to_string().chars().take(8).collect(),
        RequestRef::PendingCreation(_) => "pending".to_string(),
    }
}

pub fn display_title(request: &AggregateRequest) -> String {
    match request.artist.as_deref() {
        Some(artist) => format!("{} - {}", request.title, artist),
        None => request.title.clone(),
    }
}

pub fn format_queue_lines(requests: &[AggregateRequest]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    requests
        .iter()
        .enumerate()
        .map(|(index, request)| {
            let marker = if request.is_locked { "▶" } else { " " };
            let title = truncate(&display_title(request), 40);
            let relative_time =
                format_relative_time(request.latest_activity().timestamp_millis(), now_ms);
            format!(
                "{:>3}. {marker} {:<8}  {title:<40}  +{:<3} x{:<2}  {relative_time}",
                index + 1,
                short_id(request.reference),
                request.votes,
                request.requester_count(),
            )
        })
        .collect()
}

pub fn queue_item(position: usize, request: &AggregateRequest) -> QueueItem {
    let now_ms = Utc::now().timestamp_millis();
    QueueItem {
        position,
        id: request.reference.to_string(),
        title: request.title.clone(),
        artist: request.artist.clone(),
        votes: request.votes,
        priority: request.priority(),
        locked: request.is_locked,
        pending: request.reference.confirmed().is_none(),
        requesters: request
            .requesters
            .iter()
            .map(|requester| requester.name.clone())
            .collect(),
        messages: request
            .requesters
            .iter()
            .filter_map(|requester| requester.message_text().map(str::to_string))
            .collect(),
        created_at: request.created_at,
        relative_time: format_relative_time(request.latest_activity().timestamp_millis(), now_ms),
    }
}

pub fn format_song_lines(songs: &[Song]) -> Vec<String> {
    songs
        .iter()
        .map(|song| match song.genre.as_deref() {
            Some(genre) => format!("{} - {}  [{genre}]", song.title, song.artist),
            None => format!("{} - {}", song.title, song.artist),
        })
        .collect()
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
