use std::path::PathBuf;

use bulkstore::{BulkStorage, StorageOptions};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bulkstore", version = "0.1.0", about = "Encrypted bulk-storage engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an RSA-4096 keypair: a passphrase-encrypted PKCS#8 PEM
    /// private key and an SPKI PEM public key.
    Genkey {
        #[arg(short, long)]
        passphrase: String,
        #[arg(long, default_value = "bulkstore.key")]
        private_out: PathBuf,
        #[arg(long, default_value = "bulkstore.pub")]
        public_out: PathBuf,
    },
    /// Create a fresh container file sealed under a public key.
    Create {
        output: PathBuf,
        #[arg(short, long)]
        public_key: PathBuf,
    },
    /// Add a file's contents as a new blob.
    Add {
        container: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short = 'w', long)]
        passphrase: String,
        #[arg(short, long)]
        public_key: PathBuf,
        input: PathBuf,
    },
    /// Retrieve a blob by UUID and write it to a file (or stdout with `-`).
    Get {
        container: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short = 'w', long)]
        passphrase: String,
        uuid: String,
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },
    /// Delete a blob by UUID.
    Delete {
        container: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short = 'w', long)]
        passphrase: String,
        #[arg(short, long)]
        public_key: PathBuf,
        uuid: String,
    },
    /// List live and deleted records in the container.
    List {
        container: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short = 'w', long)]
        passphrase: String,
    },
    /// Persist the in-memory record table (re-seals the header).
    Sync {
        container: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short = 'w', long)]
        passphrase: String,
        #[arg(short, long)]
        public_key: PathBuf,
    },
    /// Show container metadata.
    Info {
        container: PathBuf,
        #[arg(short, long)]
        private_key: PathBuf,
        #[arg(short = 'w', long)]
        passphrase: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Genkey {
            passphrase,
            private_out,
            public_out,
        } => {
            let (private_pem, public_pem) = BulkStorage::gen_key(&passphrase)?;
            std::fs::write(&private_out, private_pem.as_str())?;
            std::fs::write(&public_out, public_pem)?;
            println!("Wrote {} and {}", private_out.display(), public_out.display());
        }

        Commands::Create { output, public_key } => {
            let public_key = load_public_key(&public_key)?;
            let storage = BulkStorage::create(&output, &public_key, StorageOptions::default()).await?;
            println!(
                "Created {} ({} records, tail at next write)",
                output.display(),
                storage.records().len()
            );
        }

        Commands::Add {
            container,
            private_key,
            passphrase,
            public_key,
            input,
        } => {
            let private_key_pem = std::fs::read_to_string(&private_key)?;
            let mut storage = BulkStorage::open(&container, &private_key_pem, &passphrase).await?;
            let data = std::fs::read(&input)?;
            let record = storage.add(std::io::Cursor::new(data)).await?;
            let public_key = load_public_key(&public_key)?;
            storage.sync(&public_key).await?;
            storage.close().await?;
            println!("Added {} as {}", input.display(), record.uuid);
        }

        Commands::Get {
            container,
            private_key,
            passphrase,
            uuid,
            output,
        } => {
            let private_key_pem = std::fs::read_to_string(&private_key)?;
            let mut storage = BulkStorage::open(&container, &private_key_pem, &passphrase).await?;
            let uuid = uuid::Uuid::parse_str(&uuid)?;
            match storage.get(uuid).await? {
                Some(bytes) => {
                    if output.as_os_str() == "-" {
                        use std::io::Write;
                        std::io::stdout().write_all(&bytes)?;
                    } else {
                        std::fs::write(&output, bytes)?;
                        println!("Wrote {}", output.display());
                    }
                }
                None => {
                    eprintln!("no live record for {uuid}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Delete {
            container,
            private_key,
            passphrase,
            public_key,
            uuid,
        } => {
            let private_key_pem = std::fs::read_to_string(&private_key)?;
            let mut storage = BulkStorage::open(&container, &private_key_pem, &passphrase).await?;
            let uuid = uuid::Uuid::parse_str(&uuid)?;
            let removed = storage.delete(uuid).await?;
            let public_key = load_public_key(&public_key)?;
            storage.sync(&public_key).await?;
            storage.close().await?;
            println!("{}", if removed { "deleted" } else { "not found" });
        }

        Commands::List {
            container,
            private_key,
            passphrase,
        } => {
            let private_key_pem = std::fs::read_to_string(&private_key)?;
            let storage = BulkStorage::open(&container, &private_key_pem, &passphrase).await?;
            println!("{:<38} {:>10} {:>10} {:>8}", "UUID", "start", "end", "deleted");
            for record in storage.records() {
                println!(
                    "{:<38} {:>10} {:>10} {:>8}",
                    record.uuid,
                    record.start,
                    record.end,
                    record.is_deleted()
                );
            }
        }

        Commands::Sync {
            container,
            private_key,
            passphrase,
            public_key,
        } => {
            let private_key_pem = std::fs::read_to_string(&private_key)?;
            let mut storage = BulkStorage::open(&container, &private_key_pem, &passphrase).await?;
            let public_key = load_public_key(&public_key)?;
            storage.sync(&public_key).await?;
            storage.close().await?;
            println!("Synced {}", container.display());
        }

        Commands::Info {
            container,
            private_key,
            passphrase,
        } => {
            let private_key_pem = std::fs::read_to_string(&private_key)?;
            let storage = BulkStorage::open(&container, &private_key_pem, &passphrase).await?;
            let live = storage.records().iter().filter(|r| !r.is_deleted()).count();
            let deleted = storage.records().len() - live;
            println!("── bulkstore container ──────────────────────");
            println!("  Path          {}", container.display());
            println!("  Live records  {live}");
            println!("  Deleted       {deleted}");
        }
    }

    Ok(())
}

fn load_public_key(path: &PathBuf) -> Result<rsa::RsaPublicKey, Box<dyn std::error::Error>> {
    let pem = std::fs::read_to_string(path)?;
    Ok(bulkstore::crypto::load_public_key(&pem)?)
}
