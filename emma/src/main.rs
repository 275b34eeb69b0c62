use clap::Parser;
use emma::{Cli, Conversation, TypedEar, init_logging};
use lingproc::OllamaProvider;
use std::sync::Arc;
use tracing::info;
use tts::{CoquiTts, SpeechPipeline};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let chatter = OllamaProvider::new(&cli.ollama_url, &cli.model)?;
    let synth = Arc::new(CoquiTts::new(&cli.tts_url));
    let pipeline = SpeechPipeline::new(cli.pipeline_config(), synth, cli.device_factory()?)?;
    info!(model = %cli.model, tts = %cli.tts_url, "ready");

    println!("Chatting with {}. Type 'exit', 'quit' or 'bye' to stop.", cli.model);
    let mut conversation = Conversation::new(
        Box::new(chatter),
        Box::new(TypedEar::stdin()),
        pipeline,
        cli.system_prompt.clone(),
        cli.listen_timeout(),
    );
    let result = conversation
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    conversation.into_pipeline().shutdown().await;
    println!("Chat ended. Goodbye!");
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    // A stdin read may still be parked on a blocking thread.
    std::process::exit(0)
}
