use metrics::Label;

use crate::context::CommandLabels;

fn labels(tags: Vec<(String, String)>) -> Vec<Label> {
    tags.into_iter()
        .map(|(key, value)| Label::new(key, value))
        .collect()
}

pub fn record_counter(name: &'static str, value: u64, command: &CommandLabels) {
    metrics::counter!(name, labels(command.tags())).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, command: &CommandLabels) {
    metrics::histogram!(name, labels(command.tags())).record(value);
}
