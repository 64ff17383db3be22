use crate::commands::common::{display_title, expect_success, open_session, resolve_request};
use crate::error::CliError;

pub async fn run_lock(id: &str, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    let request = resolve_request(&engine, id).await?;

    expect_success(engine.toggle_lock(request.reference).await)?;

    if request.is_locked {
        println!("Unlocked {}", display_title(&request));
    } else {
        println!("Locked {} as playing next", display_title(&request));
    }
    Ok(())
}

pub async fn run_unlock(id: &str, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    let request = resolve_request(&engine, id).await?;

    expect_success(engine.unlock(request.reference).await)?;
    println!("Unlocked {}", display_title(&request));
    Ok(())
}
