use crate::commands::common::{display_title, expect_success, open_session, resolve_request};
use crate::error::CliError;

pub async fn run_vote(id: &str, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    let request = resolve_request(&engine, id).await?;

    expect_success(engine.vote(request.reference).await)?;

    let votes = engine
        .current_requests()
        .into_iter()
        .find(|entry| entry.reference == request.reference)
        .map_or(request.votes + 1, |entry| entry.votes);
    println!("Voted for {} ({votes} votes)", display_title(&request));
    Ok(())
}
