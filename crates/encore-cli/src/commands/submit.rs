use encore_core::{NewRequest, RequestRef};

use crate::commands::common::{display_title, expect_success, open_session, short_id};
use crate::error::CliError;

pub async fn run_submit(
    title: String,
    artist: String,
    name: String,
    message: Option<String>,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    expect_success(engine.refresh_settings(false).await)?;

    let request = NewRequest {
        title,
        artist,
        requester_name: name,
        message,
        ..NewRequest::default()
    };
    let key = request.merge_key();
    expect_success(engine.submit_request(request).await)?;

    let queue = engine.current_requests();
    let entry = queue.iter().enumerate().find(|(_, request)| {
        request.key == key && matches!(request.reference, RequestRef::Confirmed(_))
    });
    if let Some((index, request)) = entry {
        println!(
            "Requested {} ({}), now #{} with {} requester(s)",
            display_title(request),
            short_id(request.reference),
            index + 1,
            request.requester_count()
        );
    } else {
        println!("Request submitted");
    }

    Ok(())
}
