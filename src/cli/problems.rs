use integration_tester::config::Config;
use integration_tester::core::TesterResult;
use integration_tester::di::ProblemSink;
use integration_tester::problems::IssueRegistry;

pub fn run(json: bool) -> TesterResult<()> {
    let config = Config::load()?;
    let registry = IssueRegistry::open(&config.get_data_dir()?)?;
    let problems = registry.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&problems)?);
        return Ok(());
    }

    if problems.is_empty() {
        println!("✓ No open problems");
        return Ok(());
    }

    for problem in &problems {
        println!("⚠ {} [{}]", problem.domain, problem.kind);
        println!("    {}", problem.context);
        println!("    → {}", problem.remedy());
    }
    Ok(())
}
