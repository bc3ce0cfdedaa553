use std::env;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use log::{error, info};

use judgebox::config::{check_seconds, ExecConfig, Layout, Limits, PipelineConfig};
use judgebox::judge::{judge, Grader, JudgeTask};
use judgebox::pipeline::Pipeline;
use judgebox::sandbox::execute;
use judgebox::utils::{absolutize, default_format, MemoryLimitType, TimeLimitType};
use judgebox::{JudgeBoxError, JudgeBoxExit};

#[derive(Parser, Debug)]
#[command(name = "judgebox", author, version, about, long_about = None)]
struct Cli {
  #[arg(long, global = true, default_value_t = false, help = "Print debug logs")]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args, Debug)]
struct LimitArgs {
  #[arg(short, long, help = "CPU time limit (unit: second)")]
  time: Option<TimeLimitType>,

  #[arg(short, long, help = "Memory limit (unit: byte)")]
  memory: Option<MemoryLimitType>,

  #[arg(long, help = "Stack limit (unit: byte), 0 keeps the inherited limit")]
  stack: Option<MemoryLimitType>,
}

#[derive(Args, Debug)]
struct ExecArgs {
  #[command(flatten)]
  limits: LimitArgs,

  #[arg(long, help = "Wall clock limit (unit: second)")]
  wall: Option<TimeLimitType>,

  #[arg(long, help = "Input file")]
  stdin: PathBuf,

  #[arg(long, default_value = "/dev/null", help = "Output file")]
  stdout: PathBuf,

  #[arg(long, default_value = "/dev/null", help = "Error file")]
  stderr: PathBuf,

  #[arg(long, default_value = "/dev/null", help = "Exec record file")]
  record: PathBuf,

  #[arg(help = "Program")]
  program: PathBuf,

  #[arg(help = "Arguments")]
  arguments: Vec<String>,
}

#[derive(Args, Debug)]
struct JudgeArgs {
  #[arg(long, help = "Compile record file, may be absent")]
  compile_record: Option<PathBuf>,

  #[arg(long, help = "Exec record file")]
  exec_record: PathBuf,

  #[arg(long, help = "Expected answer")]
  answer: PathBuf,

  #[arg(long, help = "Program output")]
  output: PathBuf,

  #[arg(long, help = "Judge record file")]
  judge_record: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
  #[command(flatten)]
  limits: LimitArgs,

  #[arg(long, default_value = "/data", help = "Root of the submission layout")]
  root: PathBuf,

  #[arg(long, help = "Program, defaults to <root>/bin/program")]
  program: Option<PathBuf>,

  #[arg(long, help = "Test manifest (JSON)")]
  manifest: Option<PathBuf>,

  #[arg(short, long, help = "Number of workers, defaults to the number of cores")]
  jobs: Option<usize>,

  #[arg(long, default_value_t = false, help = "Print the scoreboard as JSON")]
  json: bool,

  #[arg(help = "Arguments")]
  arguments: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
  #[command(about = "Run one test case")]
  Exec(ExecArgs),

  #[command(about = "Judge one test case")]
  Judge(JudgeArgs),

  #[command(about = "Run and judge every test case of a submission")]
  Run(RunArgs),
}

impl LimitArgs {
  fn resolve(&self) -> Result<Limits, JudgeBoxError> {
    let default = Limits::default();
    let limits = Limits {
      time_limit: self.time.unwrap_or(default.time_limit),
      memory_limit: self.memory.unwrap_or(default.memory_limit),
      stack_limit: self.stack.unwrap_or(default.stack_limit),
    };
    limits.check().map_err(JudgeBoxError::cli)?;
    Ok(limits)
  }
}

fn start_logger(verbose: bool) -> Result<LoggerHandle, JudgeBoxError> {
  let level = if verbose {
    "judgebox=debug"
  } else {
    "judgebox=info"
  };

  let handle = Logger::try_with_str(level)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("judgebox")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(Duplicate::Warn)
    .format_for_files(default_format)
    .start()?;

  Ok(handle)
}

impl ExecArgs {
  fn run(self) -> Result<(), JudgeBoxError> {
    if let Some(wall) = self.wall {
      check_seconds("wall limit", wall).map_err(JudgeBoxError::cli)?;
    }
    let config = ExecConfig::builder(absolutize(self.program)?, self.stdin)
      .arguments(self.arguments)
      .stdout(self.stdout)
      .stderr(self.stderr)
      .exec_record(self.record)
      .limits(self.limits.resolve()?)
      .set_wall_limit(self.wall)
      .build();

    let record = execute(&config);
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
  }
}

impl JudgeArgs {
  fn run(self) -> Result<(), JudgeBoxError> {
    let grader = match &self.compile_record {
      Some(path) => Grader::from_compile_record(path),
      None => Grader::new(None),
    };
    let task = JudgeTask {
      exec_record: self.exec_record,
      answer: self.answer,
      output: self.output,
    };
    let record = judge(&grader, &task, &self.judge_record);
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
  }
}

impl RunArgs {
  fn run(self) -> Result<(), JudgeBoxError> {
    let root = absolutize(&self.root)?;
    let under = Layout::under(&root);
    let program = match &self.program {
      Some(program) => absolutize(program)?,
      None => under.binary().to_path_buf(),
    };
    let layout = Layout::new(
      program,
      under.input_dir().to_path_buf(),
      under.answer_dir().to_path_buf(),
      under.std_dir().to_path_buf(),
      under.record_dir().to_path_buf(),
    );

    let config = PipelineConfig::builder(layout)
      .limits(self.limits.resolve()?)
      .arguments(self.arguments)
      .manifest(self.manifest)
      .jobs(self.jobs)
      .build();

    let scoreboard = Pipeline::new(config).run()?;
    if self.json {
      scoreboard.report_json();
    } else {
      scoreboard.report();
    }
    Ok(())
  }
}

fn run(command: Commands) -> Result<(), JudgeBoxError> {
  match command {
    Commands::Exec(args) => args.run(),
    Commands::Judge(args) => args.run(),
    Commands::Run(args) => args.run(),
  }
}

fn main() -> JudgeBoxExit {
  let cli = Cli::parse();

  let _logger = match start_logger(cli.verbose) {
    Ok(handle) => handle,
    Err(err) => return JudgeBoxExit::Err(err),
  };

  info!("Start running judgebox");

  let result = run(cli.command);
  match &result {
    Ok(_) => info!("Running judgebox finished"),
    Err(err) => error!("Running judgebox fails: {}", err),
  }

  result.into()
}
