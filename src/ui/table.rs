use tabled::{settings::Style, Table, Tabled};
use crate::property::PropertyDecl;
use crate::repository::ModelSummary;
use crate::storage::StoreStats;

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    model_type: String,
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
}

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Property")]
    name: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Allowed values")]
    allowed: String,
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn render<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn models_table(models: &[ModelSummary]) -> String {
    let rows: Vec<ModelRow> = models
        .iter()
        .map(|m| ModelRow {
            name: m.name.clone(),
            model_type: m.model_type.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    render(&rows)
}

pub fn versions_table(versions: &[String]) -> String {
    let rows: Vec<VersionRow> = versions.iter().map(|v| VersionRow { version: v.clone() }).collect();
    render(&rows)
}

pub fn schema_table(properties: &[PropertyDecl]) -> String {
    let rows: Vec<PropertyRow> = properties
        .iter()
        .map(|p| PropertyRow {
            name: p.name.to_string(),
            required: if p.required { "yes" } else { "no" }.to_string(),
            allowed: p
                .allowed_values
                .map(|values| values.join(", "))
                .unwrap_or_else(|| "(free text)".to_string()),
        })
        .collect();
    render(&rows)
}

pub fn stats_table(stats: &StoreStats) -> String {
    let mut rows = vec![
        MetricRow { metric: "Graph".to_string(), value: stats.graph.clone() },
        MetricRow { metric: "Records".to_string(), value: stats.records.to_string() },
    ];
    for (type_name, count) in &stats.by_type {
        rows.push(MetricRow { metric: format!("  {}", type_name), value: count.to_string() });
    }
    rows.push(MetricRow { metric: "Graphs".to_string(), value: stats.graphs.to_string() });
    render(&rows)
}
