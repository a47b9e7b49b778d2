use anyhow::{anyhow, bail, Result};

use kidsafe_core::types::StrategyKind;

pub const USAGE: &str = "\
Usage:
  kidsafe index [--source PATH]
  kidsafe retrieve <strategy> <query> [-k N] [--json]
  kidsafe compare <query> [-k N] [--json]
  kidsafe analyze <product> <ingredients> [--json]
  kidsafe chat <product> <ingredients> <previous-analysis-file> <question>

Strategies: dense, sparse, multi_query, parent_child, compression, ensemble
Global options: --source PATH overrides source.path; -k N overrides retrieval.k";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Index,
    Retrieve { strategy: StrategyKind, query: String },
    Compare { query: String },
    Analyze { product: String, ingredients: String },
    Chat { product: String, ingredients: String, analysis_file: String, question: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub command: Command,
    pub source: Option<String>,
    pub k: Option<usize>,
    pub json: bool,
}

pub fn parse(args: &[String]) -> Result<Cli> {
    let mut positionals: Vec<String> = Vec::new();
    let (mut source, mut k, mut json) = (None, None, false);
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--source" | "-s" => { source = Some(args.get(i + 1).ok_or_else(|| anyhow!("--source requires a path"))?.clone()); i += 1; }
            "-k" | "--k" => {
                let v = args.get(i + 1).ok_or_else(|| anyhow!("-k requires a number"))?;
                k = Some(v.parse::<usize>().map_err(|_| anyhow!("-k requires a number, got {v:?}"))?);
                i += 1;
            }
            "--json" => json = true,
            other if other.starts_with('-') && other.len() > 1 => bail!("unknown option {other}"),
            other => positionals.push(other.to_string()),
        }
        i += 1;
    }

    let mut rest = positionals.into_iter();
    let name = rest.next().ok_or_else(|| anyhow!("missing command"))?;
    let rest: Vec<String> = rest.collect();
    let want = |n: usize| -> Result<()> {
        if rest.len() != n { bail!("{name} takes {n} argument(s), got {}", rest.len()); }
        Ok(())
    };
    let command = match name.as_str() {
        "index" => { want(0)?; Command::Index }
        "retrieve" => { want(2)?; Command::Retrieve { strategy: rest[0].parse()?, query: rest[1].clone() } }
        "compare" => { want(1)?; Command::Compare { query: rest[0].clone() } }
        "analyze" => { want(2)?; Command::Analyze { product: rest[0].clone(), ingredients: rest[1].clone() } }
        "chat" => {
            want(4)?;
            Command::Chat { product: rest[0].clone(), ingredients: rest[1].clone(), analysis_file: rest[2].clone(), question: rest[3].clone() }
        }
        other => bail!("unknown command {other:?}"),
    };
    Ok(Cli { command, source, k, json })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> { s.iter().map(|a| a.to_string()).collect() }

    #[test]
    fn retrieve_with_options_anywhere() {
        let cli = parse(&args(&["retrieve", "-k", "3", "bm25", "Red 40", "--json"])).unwrap();
        assert_eq!(cli.command, Command::Retrieve { strategy: StrategyKind::Sparse, query: "Red 40".into() });
        assert_eq!(cli.k, Some(3));
        assert!(cli.json);
    }

    #[test]
    fn index_with_source() {
        let cli = parse(&args(&["index", "--source", "data/guide.pdf"])).unwrap();
        assert_eq!(cli.command, Command::Index);
        assert_eq!(cli.source.as_deref(), Some("data/guide.pdf"));
    }

    #[test]
    fn bad_invocations_are_errors() {
        assert!(parse(&args(&[])).is_err());
        assert!(parse(&args(&["analyze", "Only Product"])).is_err());
        assert!(parse(&args(&["retrieve", "hybrid", "q"])).is_err());
        assert!(parse(&args(&["compare", "q", "-k", "many"])).is_err());
        assert!(parse(&args(&["compare", "q", "--verbose"])).is_err());
    }
}
