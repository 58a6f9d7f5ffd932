use std::{error::Error, path::PathBuf, sync::Arc};

use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::{
    config::{self, BotConfig, CONFIG_FILE, TomlConfig},
    delivery::{MessageSink, RetryingSink, TwilioSink},
    executor::PgExecutor,
    llm::AzureOpenAiClient,
    pipeline::Pipeline,
    schema,
    server::{self, AppState},
    synthesis::Synthesizer,
};

fn init_logging(level: Level) -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[derive(clap::Args)]
struct LogArgs {
    #[arg(long, help = "Show debug information")]
    debug: bool,
    #[arg(long, help = "Explicit log level, overrides --debug")]
    log_level: Option<Level>,
}

impl LogArgs {
    fn init(&self) -> Result<(), Box<dyn Error>> {
        match (self.log_level, self.debug) {
            (Some(level), _) => init_logging(level),
            (None, true) => init_logging(Level::INFO),
            (None, false) => init_logging(Level::WARN),
        }
    }
}

fn build_pipeline(config: &BotConfig) -> Result<(Pipeline, Arc<PgExecutor>), Box<dyn Error>> {
    let llm = Arc::new(AzureOpenAiClient::new(&config.llm)?);
    let synthesizer = Synthesizer::new(
        llm,
        config.llm.sql_max_tokens,
        config.llm.answer_max_tokens,
    )?;
    let executor = Arc::new(PgExecutor::connect_lazy(&config.database)?);
    let pipeline = Pipeline::new(
        schema::describe(),
        synthesizer,
        config.gate,
        executor.clone(),
    );
    Ok((pipeline, executor))
}

#[derive(clap::Args)]
#[command(about, long_about = None, name = "init")]
pub struct Initialize {}

impl Initialize {
    pub fn init(self) -> Result<(), Box<dyn Error>> {
        let exists = std::fs::exists(CONFIG_FILE)?;
        if exists {
            eprintln!("{CONFIG_FILE} already exists.\nExiting...");
            return Ok(());
        }

        let toml = toml::to_string_pretty(&TomlConfig::template())?;
        std::fs::write(CONFIG_FILE, toml)?;
        eprintln!("Written config to {CONFIG_FILE}!");
        Ok(())
    }
}

#[derive(clap::Args)]
#[command(about = "Run the webhook server", long_about = None)]
pub struct Serve {
    #[arg(long, help = "Config file, defaults to sms-sql.toml when present")]
    config: Option<PathBuf>,
    #[command(flatten)]
    log: LogArgs,
}

impl Serve {
    pub fn serve(self) -> Result<(), Box<dyn Error>> {
        self.log.init()?;
        let config = config::load(self.config)?;
        config.log_summary()?;

        actix_web::rt::System::new().block_on(async move {
            let (pipeline, executor) = build_pipeline(&config)?;
            let sink = match &config.delivery {
                Some(delivery) => {
                    let sink: Arc<dyn MessageSink> = Arc::new(RetryingSink::new(
                        TwilioSink::new(delivery)?,
                        delivery.max_attempts,
                        delivery.backoff,
                    ));
                    Some(sink)
                }
                None => None,
            };
            let result = server::run(&config.server, AppState { pipeline, sink }).await;
            info!("Closing database pool");
            executor.close().await;
            Ok::<(), Box<dyn Error>>(result?)
        })
    }
}

#[derive(clap::Args)]
#[command(about = "Answer one question and exit", long_about = None)]
pub struct Ask {
    question: String,
    #[arg(long, help = "Config file, defaults to sms-sql.toml when present")]
    config: Option<PathBuf>,
    #[arg(long, help = "Print the generated SQL to stderr")]
    show_sql: bool,
    #[command(flatten)]
    log: LogArgs,
}

impl Ask {
    pub fn ask(self) -> Result<(), Box<dyn Error>> {
        self.log.init()?;
        let config = config::load(self.config)?;

        let runtime = tokio::runtime::Runtime::new()?;
        let transcript = runtime.block_on(async {
            let (pipeline, executor) = build_pipeline(&config)?;
            let transcript = pipeline.run(&self.question).await;
            executor.close().await;
            Ok::<_, Box<dyn Error>>(transcript)
        })?;

        if self.show_sql {
            match &transcript.statement {
                Some(statement) => eprintln!("SQL: {statement}"),
                None => eprintln!("SQL: <none generated>"),
            }
        }
        println!("{}", transcript.reply().text);
        Ok(())
    }
}
