//! Publish a handful of CDC envelopes out of order and project them.
//!
//! ```sh
//! cargo run -p tributary --example university_sync
//! ```

use serde_json::json;
use tributary::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let dir = std::env::temp_dir().join("tributary-example");
    let _ = std::fs::remove_dir_all(&dir);
    let pipeline = Pipeline::open(&dir)?;

    // department and attendance arrive before their parents
    pipeline.publish(
        Table::Departments,
        Some(&json!({"op": "c", "after": {"dept_id": 9, "institute_id": 5, "name": "Math"}})),
    )?;
    pipeline.publish(
        Table::Attendances,
        Some(&json!({"op": "c", "after": {"student_id": 3, "shedule_id": 10, "presence": true}})),
    )?;
    pipeline.publish(
        Table::Universities,
        Some(&json!({"op": "r", "after": {"university_id": 1, "name": "MSU"}})),
    )?;
    pipeline.publish(
        Table::Institutes,
        Some(&json!({"op": "c", "after": {"institute_id": 5, "university_id": 1, "name": "Eng"}})),
    )?;
    pipeline.publish(
        Table::Students,
        Some(&json!({"op": "c", "after": {"student_id": 3, "group_id": 1, "full_name": "A"}})),
    )?;

    let hierarchy = pipeline.hierarchy_runner()?.run_until_idle().await?;
    let graph = pipeline.graph_runner()?.run_until_idle().await?;
    println!("hierarchy: {:?}", hierarchy);
    println!("graph: {:?}", graph);

    if let Some(university) = pipeline.documents().university(1)? {
        println!("{}", serde_json::to_string_pretty(&university)?);
    }
    println!(
        "ATTENDED edges: {:?}",
        pipeline.graph().edges(RelType::Attended)?
    );
    Ok(())
}
