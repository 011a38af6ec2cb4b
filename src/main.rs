mod debug_report;

use goldweave::{
    Context, DemoAdjudicator, DocNode, Entity, Error, Lexicon, MatchMode, Mention, Options, QueueEntry, Result,
    StageMetrics, StemCoder, TokenIndex,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "GOLDWEAVE_LOG";

/// Options that never take a value.
const SWITCHES: &[&str] = &["strict", "check-surface"];

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    init_tracing();

    match run(&config) {
        Ok(timings) => debug_report::print_timing(&timings, config.color),
        Err(Error::Usage(msg)) => {
            eprintln!("error: {msg}\n\n{}", help_text());
            std::process::exit(2);
        }
        Err(Error::Validation(report)) => {
            debug_report::print_validation(&report, config.color);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Index,
    Validate,
    Repair,
    Iaa,
    Queue,
    Adjudicate,
    Gold,
    Entities,
    Lexicon,
    Tag,
    Link,
    Review,
    Code,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "index" => Command::Index,
            "validate" => Command::Validate,
            "repair" => Command::Repair,
            "iaa" => Command::Iaa,
            "queue" => Command::Queue,
            "adjudicate" => Command::Adjudicate,
            "gold" => Command::Gold,
            "entities" => Command::Entities,
            "lexicon" => Command::Lexicon,
            "tag" => Command::Tag,
            "link" => Command::Link,
            "review" => Command::Review,
            "code" => Command::Code,
            _ => return None,
        })
    }
}

struct CliConfig {
    command: Command,
    name: String,
    values: BTreeMap<String, String>,
    switches: BTreeSet<String>,
    options: Options,
    color: bool,
}

impl CliConfig {
    fn value(&self, key: &str) -> Result<&str> {
        self.values.get(key).map(String::as_str).ok_or_else(|| Error::Usage(format!("{} requires --{key}", self.name)))
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        self.value(key).map(PathBuf::from)
    }

    fn optional_path(&self, key: &str) -> Option<PathBuf> {
        self.values.get(key).map(PathBuf::from)
    }

    fn switch(&self, key: &str) -> bool {
        self.switches.contains(key)
    }
}

fn parse_args() -> std::result::Result<CliConfig, String> {
    let mut command: Option<(Command, String)> = None;
    let mut values = BTreeMap::new();
    let mut switches = BTreeSet::new();
    let mut config_path: Option<String> = None;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("goldweave {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            _ if arg.starts_with("--") => {
                let flag = &arg[2..];
                let (key, value) = match flag.split_once('=') {
                    Some((key, value)) => (key.to_string(), Some(value.to_string())),
                    None => (flag.to_string(), None),
                };
                if SWITCHES.contains(&key.as_str()) {
                    if value.is_some() {
                        return Err(format!("error: --{key} does not take a value"));
                    }
                    switches.insert(key);
                    continue;
                }
                let value = match value {
                    Some(value) => value,
                    None => args.next().ok_or_else(|| format!("error: --{key} expects a value"))?,
                };
                if key == "config" {
                    config_path = Some(value);
                } else if values.insert(key.clone(), value).is_some() {
                    return Err(format!("error: --{key} provided multiple times"));
                }
            }
            _ if arg.starts_with('-') => return Err(format!("error: unknown option '{arg}'")),
            _ => {
                if command.is_some() {
                    return Err(format!("error: unexpected argument '{arg}'"));
                }
                let parsed = Command::parse(&arg).ok_or_else(|| format!("error: unknown command '{arg}'"))?;
                command = Some((parsed, arg));
            }
        }
    }

    let Some((command, name)) = command else {
        return Err(format!("error: no command given\n\n{}", help_text()));
    };

    let mut options = match &config_path {
        Some(path) => Options::from_json_file(path).map_err(|err| format!("error: {err}"))?,
        None => Options::default(),
    };
    apply_overrides(&mut options, &values, &switches)?;

    Ok(CliConfig { command, name, values, switches, options, color })
}

/// Command-line values win over the config file.
fn apply_overrides(
    options: &mut Options,
    values: &BTreeMap<String, String>,
    switches: &BTreeSet<String>,
) -> std::result::Result<(), String> {
    fn number<T: std::str::FromStr>(values: &BTreeMap<String, String>, key: &str) -> std::result::Result<Option<T>, String> {
        values
            .get(key)
            .map(|raw| raw.parse::<T>().map_err(|_| format!("error: invalid --{key} '{raw}'")))
            .transpose()
    }

    if let Some(mode) = values.get("mode") {
        options.match_mode =
            MatchMode::parse(mode).ok_or_else(|| format!("error: invalid --mode '{mode}' (expected exact|overlap50)"))?;
    }
    if let Some(threshold) = number(values, "threshold")? {
        options.overlap_threshold = threshold;
    }
    if let Some(window) = number(values, "window")? {
        options.window = window;
    }
    if let Some(max_ngram) = number(values, "max-ngram")? {
        options.max_ngram = max_ngram;
    }
    if let Some(max_passages) = number(values, "max-passages")? {
        options.max_passages = Some(max_passages);
    }
    if switches.contains("strict") {
        options.strict = true;
    }
    if switches.contains("check-surface") {
        options.check_surface = true;
    }
    options.check().map_err(|err| format!("error: {err}"))
}

fn load_index(path: &Path) -> Result<TokenIndex> {
    let index: TokenIndex = goldweave::read_json(path)?;
    goldweave::check_index(&index)?;
    Ok(index)
}

/// Mention files are validated against the index before any stage sees them.
fn load_mentions(config: &CliConfig, key: &str, index: &TokenIndex, ctx: &Context) -> Result<Vec<Mention>> {
    goldweave::read_mentions(config.path(key)?, index, ctx, &config.options)
}

fn run(config: &CliConfig) -> Result<Vec<StageMetrics>> {
    let ctx = Context::default();
    let opts = &config.options;
    let color = config.color;
    let mut timings = Vec::new();

    match config.command {
        Command::Index => {
            let doc: DocNode = goldweave::read_json(config.path("doc")?)?;
            let (index, m) = StageMetrics::measure(
                "index",
                1,
                || goldweave::index_work(config.value("work-id")?, config.value("slug")?, &doc, opts),
                |r| r.as_ref().map_or(0, |i| i.passages.len()),
            );
            let index = index?;
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_json(&out, &index)?;
            debug_report::print_written(&out, index.passages.len(), color);
        }
        Command::Validate | Command::Repair => {
            let index = load_index(&config.path("index")?)?;
            let rows = goldweave::read_jsonl_values(config.path("mentions")?)?;
            let stage = if config.command == Command::Validate { "validate" } else { "repair" };
            let (checked, m) = StageMetrics::measure(
                stage,
                rows.len(),
                || match config.command {
                    Command::Validate => goldweave::validate_mentions(&index, rows, &ctx, opts),
                    _ => goldweave::repair_mentions(&index, rows, &ctx, opts),
                },
                |r| r.as_ref().map_or(0, Vec::len),
            );
            let checked = checked?;
            timings.push(m);
            match config.optional_path("out") {
                Some(out) => {
                    goldweave::write_jsonl(&out, &checked)?;
                    debug_report::print_written(&out, checked.len(), color);
                }
                None if config.command == Command::Repair => return Err(Error::Usage("repair requires --out".into())),
                None => println!("ok: {} row(s) valid", checked.len()),
            }
        }
        Command::Iaa => {
            let index = load_index(&config.path("index")?)?;
            let a = load_mentions(config, "a", &index, &ctx)?;
            let b = load_mentions(config, "b", &index, &ctx)?;
            let (report, m) =
                StageMetrics::measure("iaa", a.len() + b.len(), || goldweave::agreement(&a, &b, opts), |r| r.matched);
            timings.push(m);
            debug_report::print_agreement(&report, color);
            if let Some(out) = config.optional_path("out") {
                let top: Vec<_> = report
                    .top_confusions(20)
                    .into_iter()
                    .map(|(type_a, type_b, count)| serde_json::json!({"a": type_a, "b": type_b, "count": count}))
                    .collect();
                let summary = serde_json::json!({
                    "mode": report.mode,
                    "threshold": report.threshold,
                    "total_a": report.total_a,
                    "total_b": report.total_b,
                    "matched": report.matched,
                    "f1": report.f1(),
                    "type_agreements": report.type_agreements(),
                    "top_confusions": top,
                });
                goldweave::write_json(&out, &summary)?;
            }
            if let Some(out) = config.optional_path("disagreements") {
                goldweave::write_jsonl(&out, &report.disagreements)?;
                debug_report::print_written(&out, report.disagreements.len(), color);
            }
        }
        Command::Queue => {
            let index = load_index(&config.path("index")?)?;
            let a = load_mentions(config, "a", &index, &ctx)?;
            let b = load_mentions(config, "b", &index, &ctx)?;
            let (queue, m) = StageMetrics::measure(
                "queue",
                a.len() + b.len(),
                || goldweave::adjudication_queue(&a, &b, &index, opts),
                Vec::len,
            );
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &queue)?;
            debug_report::print_written(&out, queue.len(), color);
        }
        Command::Adjudicate => {
            let queue: Vec<QueueEntry> = goldweave::read_jsonl(config.path("queue")?)?;
            let adjudicator = match config.values.get("annotator") {
                Some(id) => DemoAdjudicator { annotator_id: id.clone() },
                None => DemoAdjudicator::default(),
            };
            let (decisions, m) = StageMetrics::measure(
                "adjudicate",
                queue.len(),
                || goldweave::adjudicate(&queue, &adjudicator, &ctx),
                Vec::len,
            );
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &decisions)?;
            debug_report::print_written(&out, decisions.len(), color);
        }
        Command::Gold => {
            let index = load_index(&config.path("index")?)?;
            let a = load_mentions(config, "a", &index, &ctx)?;
            let b = load_mentions(config, "b", &index, &ctx)?;
            let decisions = match config.optional_path("decisions") {
                Some(_) => load_mentions(config, "decisions", &index, &ctx)?,
                None => Vec::new(),
            };
            let (run, m) = StageMetrics::measure(
                "gold",
                a.len() + b.len() + decisions.len(),
                || goldweave::build_gold(&a, &b, &decisions, &ctx),
                |r| r.gold.len(),
            );
            timings.push(m);
            debug_report::print_consolidation(&run.summary, color);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &run.gold)?;
            debug_report::print_written(&out, run.gold.len(), color);
        }
        Command::Entities => {
            let index = load_index(&config.path("index")?)?;
            let gold = load_mentions(config, "gold", &index, &ctx)?;
            let (entities, m) = StageMetrics::measure(
                "entities",
                gold.len(),
                || goldweave::bootstrap_entities(&gold, &ctx.vocabulary),
                Vec::len,
            );
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &entities)?;
            debug_report::print_written(&out, entities.len(), color);
        }
        Command::Lexicon => {
            let entities: Vec<Entity> = goldweave::read_jsonl(config.path("entities")?)?;
            let (lexicon, m) = StageMetrics::measure(
                "lexicon",
                entities.len(),
                || goldweave::build_lexicon(&entities, &ctx),
                Lexicon::len,
            );
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_json(&out, &lexicon)?;
            debug_report::print_written(&out, lexicon.len(), color);
        }
        Command::Tag => {
            let index = load_index(&config.path("index")?)?;
            let lexicon: Lexicon = goldweave::read_json(config.path("lexicon")?)?;
            let (run, m) = StageMetrics::measure(
                "tag",
                index.tokens.len(),
                || goldweave::tag(&index, &lexicon, &ctx, opts),
                |r| r.as_ref().map_or(0, |run| run.mentions.len()),
            );
            let run = run?;
            timings.push(m);
            debug_report::print_coverage(&run.coverage, color);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &run.mentions)?;
            debug_report::print_written(&out, run.mentions.len(), color);
            if let Some(path) = config.optional_path("coverage") {
                goldweave::write_json(&path, &run.coverage)?;
            }
        }
        Command::Link => {
            let index = load_index(&config.path("index")?)?;
            let mentions = load_mentions(config, "mentions", &index, &ctx)?;
            let lexicon: Lexicon = goldweave::read_json(config.path("lexicon")?)?;
            let (run, m) = StageMetrics::measure(
                "link",
                mentions.len(),
                || goldweave::link(&mentions, &lexicon, &ctx),
                |r| r.linked.len(),
            );
            timings.push(m);
            debug_report::print_link(&run, color);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &run.linked)?;
            debug_report::print_written(&out, run.linked.len(), color);
            if let Some(path) = config.optional_path("unlinked") {
                goldweave::write_jsonl(&path, &run.unlinked)?;
                debug_report::print_written(&path, run.unlinked.len(), color);
            }
        }
        Command::Review => {
            let index = load_index(&config.path("index")?)?;
            let rows = load_mentions(config, "mentions", &index, &ctx)?;
            let (queue, m) =
                StageMetrics::measure("review", rows.len(), || goldweave::review_queue(&rows, &index, opts), Vec::len);
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &queue)?;
            debug_report::print_written(&out, queue.len(), color);
        }
        Command::Code => {
            let index = load_index(&config.path("index")?)?;
            let annotator = config.value("annotator")?;
            let coder = match config.values.get("max-per-passage") {
                Some(raw) => StemCoder {
                    max_per_passage: raw
                        .parse()
                        .map_err(|_| Error::Usage(format!("invalid --max-per-passage '{raw}'")))?,
                },
                None => StemCoder::default(),
            };
            let (rows, m) = StageMetrics::measure(
                "code",
                index.passages.len(),
                || goldweave::open_code(&index, &coder, annotator, &ctx),
                Vec::len,
            );
            timings.push(m);
            let out = config.path("out")?;
            goldweave::write_jsonl(&out, &rows)?;
            debug_report::print_written(&out, rows.len(), color);
        }
    }

    if config.switch("strict") && !matches!(config.command, Command::Validate | Command::Repair) {
        tracing::warn!("--strict only affects validate and repair");
    }
    Ok(timings)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "goldweave {version}

Reconcile annotator mention streams into an entity-linked gold layer.

Usage:
  goldweave [OPTIONS] <command> [--key value ...]

Commands:
  index       --doc <tree.json> --work-id <id> --slug <slug> --out <index.json> [--max-passages N]
  validate    --index <index.json> --mentions <rows.jsonl> [--check-surface] [--out <rows.jsonl>]
  repair      --index <index.json> --mentions <rows.jsonl> --out <rows.jsonl> [--strict]
  iaa         --index <index.json> --a <a.jsonl> --b <b.jsonl> [--mode exact|overlap50] [--threshold T]
              [--out <summary.json>] [--disagreements <rows.jsonl>]
  queue       --index <index.json> --a <a.jsonl> --b <b.jsonl> --out <queue.jsonl> [--window N]
  adjudicate  --queue <queue.jsonl> --out <decisions.jsonl> [--annotator <id>]
  gold        --index <index.json> --a <a.jsonl> --b <b.jsonl> [--decisions <decisions.jsonl>]
              --out <gold.jsonl>
  entities    --index <index.json> --gold <gold.jsonl> --out <entities.jsonl>
  lexicon     --entities <entities.jsonl> --out <lexicon.json>
  tag         --index <index.json> --lexicon <lexicon.json> --out <mentions.jsonl>
              [--coverage <coverage.json>] [--max-ngram N]
  link        --index <index.json> --mentions <rows.jsonl> --lexicon <lexicon.json> --out <linked.jsonl>
              [--unlinked <rows.jsonl>]
  review      --index <index.json> --mentions <rows.jsonl> --out <review.jsonl>
  code        --index <index.json> --annotator <id> --out <rows.jsonl> [--max-per-passage N]

Options:
  --config <options.json>    JSON options file; command-line values override it.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}              Log filter (tracing EnvFilter syntax). Default: warn

Every mention file is validated against --index; all offending lines are
listed before exiting.

Exit codes:
  0  Success.
  1  Runtime failure (I/O, malformed input, validation).
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}
