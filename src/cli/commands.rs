use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "forge-chain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "init",
        about = "Create the genesis block and print its reward keypair"
    )]
    Init,
    #[command(name = "generate-address", about = "Generate a new keypair and address")]
    GenerateAddress,
    #[command(
        name = "submit-transaction",
        about = "Validate a signed transaction and add it to the pool"
    )]
    SubmitTransaction {
        #[arg(help = "Path to the transaction as JSON")]
        file: PathBuf,
    },
    #[command(name = "get-block", about = "Print one block by hash or height")]
    GetBlock {
        #[arg(help = "64-character block hash or decimal height")]
        id: String,
    },
    #[command(name = "list-blocks", about = "Print blocks in chain order")]
    ListBlocks {
        #[arg(long, default_value_t = 0, help = "Blocks to skip")]
        offset: u64,
        #[arg(long, default_value_t = 20, help = "Maximum blocks to print")]
        limit: usize,
    },
    #[command(name = "pending", about = "Print the pooled transactions")]
    Pending,
    #[command(name = "info", about = "Print chain parameters and current height")]
    Info,
    #[command(name = "node", about = "Run the background miner")]
    Node,
}
