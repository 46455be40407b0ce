//! Generates a DKIM key pair: a PEM private key and the matching DNS TXT
//! record to publish under `<selector>._domainkey.<domain>`.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use base64::engine::general_purpose;
use base64::Engine;
use clap::Parser;

use maildkim::Algorithm;

#[derive(Parser)]
#[command(name = "dkimkeygen", about = "Generate a DKIM key pair")]
struct Args {
    /// Signature algorithm the key is meant for
    #[arg(short = 'a', long = "algorithm", default_value = "rsa-sha256")]
    algorithm: String,

    /// RSA key size in bits
    #[arg(short = 's', long = "size")]
    bits: Option<usize>,

    /// Where to write the PEM private key
    #[arg(short = 'o', long = "out", default_value = "private.pem")]
    private_key: PathBuf,

    /// Where to write the DNS TXT record
    #[arg(short = 'd', long = "dns", default_value = "dns.txt")]
    dns_record: PathBuf,

    /// Also write the public key as PEM to this path
    #[arg(short = 'p', long = "pub")]
    public_key_pem: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let algorithm = match Algorithm::from_name(&args.algorithm) {
        Some(algorithm) => algorithm,
        None => {
            eprintln!("unknown algorithm: {}", args.algorithm);
            exit(1);
        }
    };

    let (private_key, public_key) = match algorithm.generate_key(args.bits) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("{}", err);
            exit(2);
        }
    };

    let public_bytes = match algorithm.export_public_key_bytes(&public_key) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("{}", err);
            exit(3);
        }
    };
    if let Err(err) = write_file(&args.dns_record, |f| {
        write!(
            f,
            "v=DKIM1; k={}; p={}",
            algorithm.base_name(),
            general_purpose::STANDARD.encode(public_bytes)
        )
    }) {
        eprintln!("{}", err);
        exit(4);
    }

    let pem = match algorithm.export_private_key(&private_key) {
        Ok(pem) => pem,
        Err(err) => {
            eprintln!("{}", err);
            exit(5);
        }
    };
    if let Err(err) = write_file(&args.private_key, |f| f.write_all(pem.as_bytes())) {
        eprintln!("{}", err);
        exit(5);
    }

    if let Some(path) = &args.public_key_pem {
        let pem = match algorithm.export_public_key(&public_key) {
            Ok(pem) => pem,
            Err(err) => {
                eprintln!("{}", err);
                exit(6);
            }
        };
        if let Err(err) = write_file(path, |f| f.write_all(pem.as_bytes())) {
            eprintln!("{}", err);
            exit(6);
        }
    }
}

fn write_file(
    path: &PathBuf,
    write: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    write(&mut file)
}
