use chrono::{TimeZone, Utc};
use encore_core::models::{LocalToken, Requester, RequestSource};
use encore_core::{AggregateRequest, ErrorClass, Outcome, RequestId, RequestRef, Role};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use crate::cli::{CompletionShell, RoleArg};
use crate::commands::common::{
    expect_success, find_request, format_queue_lines, format_relative_time,
    normalize_request_identifier, queue_item, short_id, truncate,
};
use crate::commands::completions::render_completions;
use crate::commands::config::{apply_profile_init, describe_profile, missing_fields, ProfileInit};
use crate::commands::demo::run_demo;
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn aggregate(id: &str, title: &str, votes: i64) -> AggregateRequest {
    let id: RequestId = id.parse().unwrap();
    let created_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    AggregateRequest {
        reference: RequestRef::Confirmed(id),
        request_ids: vec![id],
        key: format!("{}|band", title.to_lowercase()),
        title: title.to_string(),
        artist: Some("Band".to_string()),
        votes,
        is_locked: false,
        is_played: false,
        created_at,
        requesters: vec![Requester {
            id: Uuid::new_v4(),
            request_id: id,
            name: "Ana".to_string(),
            photo: None,
            message: Some("  for the birthday ".to_string()),
            timestamp: created_at,
            source: RequestSource::Web,
        }],
    }
}

fn sample_queue() -> Vec<AggregateRequest> {
    vec![
        aggregate("0192f0c1-aaaa-7000-8000-000000000001", "Valerie", 3),
        aggregate("0192f0c1-aaaa-7000-8000-000000000002", "Intro", 1),
        aggregate("5b3e0c1d-bbbb-4000-8000-000000000003", "Dancing Queen", 0),
    ]
}

#[test]
fn find_request_matches_full_id() {
    let queue = sample_queue();
    let found = find_request(&queue, "0192f0c1-aaaa-7000-8000-000000000002").unwrap();
    assert_eq!(found.title, "Intro");
}

#[test]
fn find_request_matches_unique_prefix() {
    let queue = sample_queue();
    let found = find_request(&queue, "5B3E").unwrap();
    assert_eq!(found.title, "Dancing Queen");
}

#[test]
fn find_request_rejects_ambiguous_prefix() {
    let queue = sample_queue();
    let error = find_request(&queue, "0192f0c1").unwrap_err();
    assert!(matches!(error, CliError::AmbiguousRequestId(_)));
    assert!(error.to_string().contains("0192f0c1"));
}

#[test]
fn find_request_reports_missing_id() {
    let queue = sample_queue();
    assert!(matches!(
        find_request(&queue, "ffff"),
        Err(CliError::RequestNotFound(_))
    ));
}

#[test]
fn request_identifier_rejects_blank() {
    assert!(matches!(
        normalize_request_identifier("   "),
        Err(CliError::EmptyRequestId)
    ));
    assert_eq!(normalize_request_identifier(" 5b3e ").unwrap(), "5b3e");
}

#[test]
fn pending_entries_show_placeholder_id() {
    let mut entry = aggregate("5b3e0c1d-bbbb-4000-8000-000000000003", "Valerie", 0);
    entry.reference = RequestRef::PendingCreation(LocalToken::new());
    assert_eq!(short_id(entry.reference), "pending");
    assert!(queue_item(1, &entry).pending);
}

#[test]
fn queue_lines_mark_locked_entry() {
    let mut queue = sample_queue();
    queue[1].is_locked = true;
    let lines = format_queue_lines(&queue);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains('▶'));
    assert!(!lines[0].contains('▶'));
    assert!(lines[0].starts_with("  1."));
    assert!(lines[0].contains("Valerie - Band"));
}

#[test]
fn queue_item_carries_requesters_and_messages() {
    let queue = sample_queue();
    let item = queue_item(1, &queue[0]);
    assert_eq!(item.requesters, vec!["Ana".to_string()]);
    assert_eq!(item.messages, vec!["for the birthday".to_string()]);
    assert_eq!(item.priority, 4);
    assert!(!item.pending);
}

#[test]
fn truncate_adds_ellipsis() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer title", 10), "a much ...");
}

#[test]
fn format_relative_time_units() {
    let now = 100_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 26 * 60 * 60_000, now), "1d ago");
}

#[test]
fn expect_success_surfaces_classified_error() {
    assert!(expect_success(Outcome::ok()).is_ok());

    let outcome = Outcome::failed(encore_core::Error::Conflict("already voted".to_string()));
    let error = expect_success(outcome).unwrap_err();
    match error {
        CliError::Rejected(classified) => assert_eq!(classified.class, ErrorClass::Conflict),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn profile_init_generates_voter_id_and_validates_url() {
    let mut profile = CliProfile::default();
    apply_profile_init(
        &mut profile,
        ProfileInit {
            supabase_url: Some("https://project.supabase.co/".to_string()),
            supabase_anon_key: Some("anon-key".to_string()),
            role: Some(RoleArg::Operator.into()),
            ..ProfileInit::default()
        },
    )
    .unwrap();

    assert_eq!(
        profile.supabase_url.as_deref(),
        Some("https://project.supabase.co")
    );
    assert!(profile.voter_id.is_some());
    assert_eq!(profile.role, Role::Operator);
    assert_eq!(missing_fields(&profile), vec!["access_token"]);

    let voter_id = profile.voter_id.clone();
    apply_profile_init(&mut profile, ProfileInit::default()).unwrap();
    assert_eq!(profile.voter_id, voter_id);

    let error = apply_profile_init(
        &mut profile,
        ProfileInit {
            supabase_url: Some("project.supabase.co".to_string()),
            ..ProfileInit::default()
        },
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
}

#[test]
fn describe_profile_hides_secrets() {
    let profile = CliProfile {
        supabase_url: Some("https://project.supabase.co".to_string()),
        supabase_anon_key: Some("super-secret".to_string()),
        voter_id: Some("voter-1".to_string()),
        ..CliProfile::default()
    };
    let lines = describe_profile("default", &profile).join("\n");
    assert!(!lines.contains("super-secret"));
    assert!(lines.contains("supabase_anon_key: set"));
    assert!(lines.contains("access_token:      missing"));
    assert!(lines.contains("role:              guest"));
}

#[test]
fn completions_reference_binary_name() {
    for shell in [CompletionShell::Bash, CompletionShell::Zsh, CompletionShell::Fish] {
        let script = String::from_utf8(render_completions(shell)).unwrap();
        assert!(script.contains("encore"));
    }
}

#[tokio::test]
async fn demo_walkthrough_completes() {
    run_demo().await.unwrap();
}
