use clap::Parser;
use data_encoding::HEXLOWER;
use forge_chain::core::transaction::HASH_LEN;
use forge_chain::{
    Chain, ChainError, ChainEvent, ChainStore, ChannelSink, Command, EventSink, Keypair, Mempool,
    Miner, NullSink, Opt, Result, Settings, TxOutput, GLOBAL_SETTINGS,
};
use log::{error, info, LevelFilter};
use std::process;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn open_store(settings: &Settings) -> Result<Arc<ChainStore>> {
    Ok(Arc::new(ChainStore::open(&settings.data_dir)?))
}

fn chain_with(store: Arc<ChainStore>, settings: &Settings, events: Arc<dyn EventSink>) -> Chain {
    Chain::new(store, events, settings.difficulty, settings.block_reward)
}

fn run_command(command: Command) -> Result<()> {
    let settings = &*GLOBAL_SETTINGS;

    match command {
        // Create the genesis block once; every later block pays its reward
        // to the same lock script, so the keypair printed here is the one
        // that can spend mining income.
        Command::Init => {
            let store = open_store(settings)?;
            if let Some(tip) = store.tip_hash()? {
                println!("Chain already initialized, tip {tip}");
                return Ok(());
            }

            let keys = Keypair::generate()?;
            let chain = Arc::new(chain_with(Arc::clone(&store), settings, Arc::new(NullSink)));
            let miner = Miner::new(
                Arc::clone(&chain),
                settings.genesis_message.clone(),
                settings.max_transactions_per_block,
                Duration::from_secs(settings.mining_interval_secs),
            );

            let block = miner.generate_block(
                vec![0u8; HASH_LEN],
                &settings.genesis_message,
                vec![TxOutput::new(
                    settings.block_reward,
                    forge_chain::lock_script_for(&keys.address),
                )],
                vec![],
            )?;
            let record = chain.submit(&block)?;

            println!("Genesis block {}", record.hash);
            println!("Reward address: {}", keys.address);
            println!("Public key:     {}", HEXLOWER.encode(&keys.public_key));
            println!("Private key:    {}", HEXLOWER.encode(&keys.pkcs8));
        }
        Command::GenerateAddress => {
            let keys = Keypair::generate()?;
            println!("Address:     {}", keys.address);
            println!("Public key:  {}", HEXLOWER.encode(&keys.public_key));
            println!("Private key: {}", HEXLOWER.encode(&keys.pkcs8));
        }
        Command::SubmitTransaction { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let tx: forge_chain::Transaction = serde_json::from_str(&raw)
                .map_err(|e| ChainError::MalformedEncoding(format!("Bad transaction JSON: {e}")))?;

            let store = open_store(settings)?;
            let pool = Mempool::new(store, Arc::new(NullSink));
            let record = pool.submit(&tx)?;
            println!("Pooled {} with fee {}", record.hash, record.fee);
        }
        Command::GetBlock { id } => {
            let store = open_store(settings)?;
            let block = if id.len() == HASH_LEN * 2 {
                store.find_block(&id)?
            } else {
                let height: u64 = id.parse().map_err(|_| {
                    ChainError::MalformedEncoding(format!(
                        "Block id must be a {}-character hash or a height, got {id:?}",
                        HASH_LEN * 2
                    ))
                })?;
                store.find_block_by_height(height)?
            };
            match block {
                Some(block) => println!("{}", render_json(&block)?),
                None => println!("Block {id} not found"),
            }
        }
        Command::ListBlocks { offset, limit } => {
            let store = open_store(settings)?;
            for block in store.list_blocks(offset, limit)? {
                println!(
                    "{:>6}  {}  {} tx",
                    block.height,
                    block.hash,
                    block.transaction_hashes.len()
                );
            }
        }
        Command::Pending => {
            let store = open_store(settings)?;
            for record in store.pooled_transactions()? {
                println!("{}", render_json(&record)?);
            }
        }
        Command::Info => {
            let store = open_store(settings)?;
            println!("Difficulty: {}", settings.difficulty);
            println!("Reward:     {}", settings.block_reward);
            match store.height()? {
                Some(height) => println!("Height:     {height}"),
                None => println!("Height:     (no genesis yet)"),
            }
        }
        Command::Node => {
            let store = open_store(settings)?;
            if store.tip_hash()?.is_none() {
                return Err(ChainError::Config(
                    "No genesis block, run `forge-chain init` first".to_string(),
                ));
            }

            let (sender, receiver) = mpsc::channel();
            let events: Arc<dyn EventSink> = Arc::new(ChannelSink::new(sender));
            let chain = Arc::new(chain_with(store, settings, events));
            let miner = Miner::new(
                Arc::clone(&chain),
                settings.genesis_message.clone(),
                settings.max_transactions_per_block,
                Duration::from_secs(settings.mining_interval_secs),
            );

            let handle = miner.spawn();
            let logger = thread::spawn(move || {
                for event in receiver {
                    match event {
                        ChainEvent::TransactionAccepted { hash } => {
                            info!("Pooled transaction {hash}")
                        }
                        ChainEvent::TransactionConfirmed { hash } => {
                            info!("Confirmed transaction {hash}")
                        }
                        ChainEvent::BlockAccepted { hash } => info!("Accepted block {hash}"),
                    }
                }
            });

            handle
                .join()
                .map_err(|_| ChainError::Internal("Miner thread panicked".to_string()))?;
            chain.store().flush()?;
            drop(chain);
            logger
                .join()
                .map_err(|_| ChainError::Internal("Event logger panicked".to_string()))?;
        }
    }
    Ok(())
}

fn render_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ChainError::Serialization(format!("JSON rendering: {e}")))
}
