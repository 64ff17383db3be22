//! Scripted walk-through of the sync engine against an in-memory backend.

use chrono::{Duration as ChronoDuration, Utc};
use encore_core::gateway::FailurePoint;
use encore_core::models::{Requester, RequestSource};
use encore_core::{
    EngineConfig, MemoryBackend, NewRequest, Outcome, Request, RequestId, RequestRef,
    SessionIdentity, Song, SyncOrchestrator,
};
use uuid::Uuid;

use crate::commands::common::{display_title, format_queue_lines};
use crate::error::CliError;

type Session = SyncOrchestrator<MemoryBackend>;

pub async fn run_demo() -> Result<(), CliError> {
    let backend = MemoryBackend::new();
    seed(&backend);

    let ana = SyncOrchestrator::new(
        backend.clone(),
        EngineConfig::default(),
        SessionIdentity::guest("ana"),
    )?;
    let ben = SyncOrchestrator::new(
        backend.clone(),
        EngineConfig::default(),
        SessionIdentity::guest("ben"),
    )?;
    let dj = SyncOrchestrator::new(
        backend.clone(),
        EngineConfig::default(),
        SessionIdentity::operator("dj"),
    )?;
    let rival = SyncOrchestrator::new(
        backend.clone(),
        EngineConfig::default(),
        SessionIdentity::operator("second-dj"),
    )?;

    report("Start session", ana.start().await);
    show(&ana).await;

    report(
        "Ana requests Valerie",
        ana.submit_request(new_request("Valerie", "Amy Winehouse", "Ana")).await,
    );
    report(
        "Ben requests valerie (different casing)",
        ben.submit_request(new_request(" valerie ", "amy winehouse", "Ben"))
            .await,
    );
    show(&ana).await;

    let Some(valerie) = find(&ana, "valerie|amy winehouse").await else {
        return Err(CliError::RequestNotFound("Valerie".to_string()));
    };
    refresh(&ben).await;
    report("Ben votes for Valerie", ben.vote(valerie).await);
    report("Ben votes again", ben.vote(valerie).await);

    let Some(intro) = find(&ana, "intro|the xx").await else {
        return Err(CliError::RequestNotFound("Intro".to_string()));
    };
    backend.fail_next(FailurePoint::Invoke, 503, 1);
    report(
        "Ana votes for Intro while the backend fails",
        ana.vote(intro).await,
    );
    show(&ana).await;

    refresh(&dj).await;
    refresh(&rival).await;
    let (first, second) = tokio::join!(dj.toggle_lock(valerie), rival.toggle_lock(intro));
    report("First operator locks Valerie", first);
    report("Second operator locks Intro at the same moment", second);
    show(&ana).await;

    let locked = ana.current_requests().into_iter().find(|entry| entry.is_locked);
    if let Some(locked) = locked {
        println!("Exactly one entry is locked: {}", display_title(&locked));
        report("Operator clears the lock", dj.unlock(locked.reference).await);
    }
    show(&ana).await;

    ana.stop().await;
    Ok(())
}

fn seed(backend: &MemoryBackend) {
    backend.seed_songs(vec![
        song("Valerie", "Amy Winehouse", "Soul"),
        song("Intro", "The xx", "Indie"),
        song("Dancing Queen", "ABBA", "Pop"),
    ]);

    let now = Utc::now();
    backend.seed_request(seed_request(
        "Intro",
        "The xx",
        2,
        now - ChronoDuration::minutes(6),
        "Cleo",
    ));
    backend.seed_request(seed_request(
        "Dancing Queen",
        "ABBA",
        1,
        now - ChronoDuration::minutes(3),
        "Dev",
    ));
}

fn song(title: &str, artist: &str, genre: &str) -> Song {
    Song {
        id: Uuid::new_v4(),
        title: title.to_string(),
        artist: artist.to_string(),
        genre: Some(genre.to_string()),
        key: None,
        album_art_url: None,
    }
}

fn seed_request(
    title: &str,
    artist: &str,
    votes: i64,
    created_at: chrono::DateTime<Utc>,
    requester: &str,
) -> Request {
    let id = RequestId::new();
    Request {
        id,
        title: title.to_string(),
        artist: Some(artist.to_string()),
        votes,
        is_locked: false,
        is_played: false,
        is_active: true,
        created_at,
        requesters: vec![Requester {
            id: Uuid::new_v4(),
            request_id: id,
            name: requester.to_string(),
            photo: None,
            message: None,
            timestamp: created_at,
            source: RequestSource::Web,
        }],
    }
}

fn new_request(title: &str, artist: &str, name: &str) -> NewRequest {
    NewRequest {
        title: title.to_string(),
        artist: artist.to_string(),
        requester_name: name.to_string(),
        ..NewRequest::default()
    }
}

async fn find(session: &Session, key: &str) -> Option<RequestRef> {
    refresh(session).await;
    session
        .current_requests()
        .into_iter()
        .find(|entry| entry.key == key)
        .map(|entry| entry.reference)
}

async fn refresh(session: &Session) {
    let outcome = session.refresh(true).await;
    if !outcome.success {
        report("Refresh", outcome);
    }
}

async fn show(session: &Session) {
    refresh(session).await;
    for line in format_queue_lines(&session.current_requests()) {
        println!("{line}");
    }
    println!();
}

fn report(step: &str, outcome: Outcome) {
    match outcome.error {
        None => println!("== {step}: ok"),
        Some(error) => println!("== {step}: {:?} ({})", error.class, error.message),
    }
}
