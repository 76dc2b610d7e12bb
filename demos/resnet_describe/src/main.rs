use burn::backend::NdArray;
use burn::prelude::Tensor;
use clap::Parser;
use resnet_arch::models::resnet::{ArchitectureConfig, ResNetHandle};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Build a `ResNet` layer graph and describe it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ResNet version: 18, 34, 50, 101 or 152.
    #[arg(long, default_value = "50")]
    version: usize,

    /// Input channels.
    #[arg(long, default_value = "3")]
    channels: usize,

    /// Input width.
    #[arg(long, default_value = "224")]
    width: usize,

    /// Input height.
    #[arg(long, default_value = "224")]
    height: usize,

    /// Classifier outputs.
    #[arg(long, default_value = "1000")]
    num_classes: usize,

    /// Drop the pool + linear head.
    #[arg(long)]
    no_top: bool,

    /// Load pretrained ImageNet weights (requires the `pretrained` feature).
    #[arg(long)]
    pretrained: bool,

    /// Print the graph as JSON instead of a summary table.
    #[arg(long)]
    json: bool,

    /// Also list the layers inside each residual block.
    #[arg(long)]
    expand: bool,

    /// Instantiate the model and run one zero batch through it.
    #[arg(long)]
    forward: bool,

    /// Save the instantiated model record to this path.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    type B = NdArray<f32>;

    let config = ArchitectureConfig::new(args.version, args.channels, args.width, args.height)
        .with_num_classes(args.num_classes)
        .with_include_top(!args.no_top)
        .with_pretrained(args.pretrained);

    let graph = config.build()?;
    if args.json {
        println!("{}", graph.to_json()?);
    } else if args.expand {
        println!("{graph:#}");
    } else {
        println!("{graph}");
    }

    if !(args.forward || args.pretrained || args.save.is_some()) {
        return Ok(());
    }

    let device = Default::default();
    let handle: ResNetHandle<B> = ResNetHandle::new(&config, &device)?;

    if args.forward {
        let input = Tensor::<B, 4>::zeros([1, args.channels, args.height, args.width], &device);
        let output = handle.get_model().forward(input);
        tracing::info!(dims = ?output.dims(), "forward");
        println!("output: {:?}", output.dims());
    }

    if let Some(path) = &args.save {
        handle.save_model(path)?;
        println!("saved: {}", path.display());
    }

    Ok(())
}
