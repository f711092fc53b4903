use std::sync::Arc;

use huchash::{DagConfig, FullDAG, LightDAG};

fn main() {
    // a poor man cli parser.
    let mut args = std::env::args().skip(1);

    let number: u64 = args
        .next()
        .map(|v| v.parse().unwrap_or_else(|_| print_help()))
        .unwrap_or_else(|| print_help());
    let config = match args.next() {
        Some(dir) => DagConfig::with_dataset_dir(dir),
        None => DagConfig::default(),
    };

    let light = Arc::new(LightDAG::new(number).expect("failed to allocate the cache"));
    println!(
        "block {} epoch {} seed {:?} dataset size: {} MB",
        number,
        light.epoch(),
        light.seed(),
        light.full_size() / (1024 * 1024)
    );

    let full = FullDAG::with_config(light, &config, |percent| {
        println!("generating DAG: {}%", percent);
        false
    })
    .expect("failed to prepare the DAG");

    let r = full.compute(Default::default(), 0);
    println!(
        "DAG ready in {}: result {:?} mix {:?}",
        config.dataset_dir.display(),
        r.result,
        r.mix_hash
    );
}

fn print_help() -> ! {
    println!("usage: dag <BLOCK_NUMBER> [DATASET_DIR]");
    std::process::exit(1);
}
