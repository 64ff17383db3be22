use crate::commands::common::{expect_success, format_song_lines, open_session};
use crate::error::CliError;

pub async fn run_songs(limit: usize, as_json: bool, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    expect_success(engine.refresh_songs(true).await)?;

    let songs = engine.songs().into_iter().take(limit).collect::<Vec<_>>();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&songs)?);
    } else {
        for line in format_song_lines(&songs) {
            println!("{line}");
        }
    }

    Ok(())
}
