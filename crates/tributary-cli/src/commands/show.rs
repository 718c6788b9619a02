//! Show command implementation

use crate::ShowCommands;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use tributary::prelude::*;
use tributary::Label;

pub fn execute(config: PipelineConfig, command: ShowCommands) -> Result<()> {
    let pipeline = Pipeline::open_with_config(config).context("Failed to open pipeline")?;

    let output = match command {
        ShowCommands::University { id } => {
            let university = pipeline
                .documents()
                .university(id)?
                .with_context(|| format!("University {} not found", id))?;
            serde_json::to_value(university)?
        }
        ShowCommands::Graph => graph_json(&pipeline)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn graph_json(pipeline: &Pipeline) -> Result<Value> {
    let graph = pipeline.graph();

    let mut nodes = serde_json::Map::new();
    for label in [Label::Group, Label::Student, Label::Schedule] {
        let list: Vec<Value> = graph
            .nodes(label)?
            .into_iter()
            .map(|(id, props)| json!({"id": id, "properties": props}))
            .collect();
        nodes.insert(label.to_string(), Value::Array(list));
    }

    let mut edges = serde_json::Map::new();
    for rel in [RelType::BelongsTo, RelType::HasSchedule, RelType::Attended] {
        let list: Vec<Value> = graph
            .edges(rel)?
            .into_iter()
            .map(|(from, to)| json!({"from": from.to_string(), "to": to.to_string()}))
            .collect();
        edges.insert(rel.to_string(), Value::Array(list));
    }

    Ok(json!({"nodes": nodes, "relationships": edges}))
}
