use crate::commands::common::{
    expect_success, format_queue_lines, open_session, queue_item, QueueItem,
};
use crate::error::CliError;

pub async fn run_queue(limit: usize, as_json: bool, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    expect_success(engine.refresh(true).await)?;

    let requests = engine
        .current_requests()
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>();

    if as_json {
        let json_items = requests
            .iter()
            .enumerate()
            .map(|(index, request)| queue_item(index + 1, request))
            .collect::<Vec<QueueItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if requests.is_empty() {
        println!("The queue is empty");
    } else {
        for line in format_queue_lines(&requests) {
            println!("{line}");
        }
    }

    Ok(())
}
