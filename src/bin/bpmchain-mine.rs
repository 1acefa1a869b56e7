#![forbid(unsafe_code)]
//! Mine a single block on top of genesis and report what it cost.
//!
//! Useful for choosing a difficulty: expected attempts grow as 16^difficulty.

use bpmchain::blockchain::{is_block_valid, Block, ChainParams, HashAlgorithm};
use bpmchain::miner::{mine_block, CancelToken, MiningControl};
use clap::Parser;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bpmchain-mine", version, about = "Benchmark one proof-of-work search")]
struct Cli {
    /// Leading zero hex characters required
    #[arg(short, long, default_value_t = 3)]
    difficulty: u32,

    /// Payload to record in the block
    #[arg(short, long, default_value_t = 72)]
    payload: u64,

    /// Digest algorithm (sha256 or sha512)
    #[arg(long, default_value = "sha256")]
    digest: String,

    /// Give up after this many seconds
    #[arg(short, long)]
    timeout: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let algorithm: HashAlgorithm = serde_json::from_value(serde_json::Value::String(cli.digest.to_lowercase()))
        .map_err(|_| format!("unknown digest {:?}, expected sha256 or sha512", cli.digest))?;
    if cli.difficulty as usize > algorithm.hex_len() {
        return Err(format!("difficulty {} exceeds {} digest length", cli.difficulty, algorithm).into());
    }

    let genesis = Block::genesis(algorithm);
    let control = MiningControl::new(CancelToken::new(), cli.timeout.map(Duration::from_secs));

    println!("Mining block 1 at difficulty {} ({})...", cli.difficulty, algorithm);
    let mined = mine_block(Block::next(&genesis, cli.payload)?, cli.difficulty, algorithm, &control)?;

    let params = ChainParams::new(algorithm, cli.difficulty);
    let rate = mined.attempts as f64 / mined.elapsed.as_secs_f64().max(f64::EPSILON);

    println!("Hash:       {}", mined.block.hash);
    println!("Previous:   {}", mined.block.prev_hash);
    println!("Nonce:      {}", mined.block.nonce.as_deref().unwrap_or("-"));
    println!("Attempts:   {} (expected ~{})", mined.attempts, 16f64.powi(cli.difficulty as i32));
    println!("Elapsed:    {:.3}s ({:.0} hashes/s)", mined.elapsed.as_secs_f64(), rate);
    println!("Valid:      {}", is_block_valid(&mined.block, &genesis, &params));

    Ok(())
}
