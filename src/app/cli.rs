#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Validate,
    BuildRegistry,
    Resolve,
    Route,
    Gaps,
    Policy,
    Execute,
    Run,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "validate" => CliVerb::Validate,
        "build-registry" => CliVerb::BuildRegistry,
        "resolve" => CliVerb::Resolve,
        "route" => CliVerb::Route,
        "gaps" => CliVerb::Gaps,
        "policy" => CliVerb::Policy,
        "execute" => CliVerb::Execute,
        "run" => CliVerb::Run,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  validate                             Validate every tool manifest".to_string(),
        "  build-registry                       Validate manifests and write the registry cache"
            .to_string(),
        "  resolve <capability>                 Show the best tool for a capability".to_string(),
        "  route <request.json>                 Turn a request into a planned workflow".to_string(),
        "  gaps <plan.json>                     Bind plan steps to tools and report gaps"
            .to_string(),
        "  policy <plan.json> [--preview]       Check a plan against the execution policy"
            .to_string(),
        "  execute <plan.json> [--request <request.json>] [--dry-run]".to_string(),
        "                                       Run a complete plan".to_string(),
        "  run <request.json> [--dry-run]       Route, gate, check and run a request".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    let mut lines = vec![
        "capflow: capability-based workflow orchestrator".to_string(),
        String::new(),
    ];
    lines.extend(cli_help_lines());
    lines.push(String::new());
    lines.push(format!(
        "Settings: ${} or ${}/config.yaml (default ~/.capflow/config.yaml)",
        crate::config::CONFIG_ENV,
        crate::config::HOME_ENV
    ));
    lines.join("\n")
}
