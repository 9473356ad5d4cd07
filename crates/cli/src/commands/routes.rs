use triage_core::routing::ROUTING_TABLE;

pub fn run() -> String {
    let mut lines = vec!["routing table (intent -> resolvers, run concurrently):".to_string()];
    for (intent, resolvers) in ROUTING_TABLE {
        let names = resolvers.iter().map(|kind| kind.as_str()).collect::<Vec<_>>().join(", ");
        lines.push(format!("- {intent} -> {names}"));
    }
    lines.push("- <unrecognised label> -> treated as multiple".to_string());
    lines.join("\n")
}
