//! Signs a message read on stdin, writing the signed message (or just the
//! `DKIM-Signature:` header) on stdout.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use maildkim::normalize::{file_buffer, NormalizingReader};
use maildkim::{Algorithm, SignerBuilder};

#[derive(Parser)]
#[command(
    name = "dkimsign",
    about = "DKIM-sign a message read on stdin",
    disable_help_flag = true
)]
struct Args {
    /// Signature algorithm
    #[arg(short = 'a', long = "algorithm", default_value = "rsa-sha256")]
    algorithm: String,

    /// Canonicalization scheme
    #[arg(short = 'c', long = "canonicalization", default_value = "relaxed/relaxed")]
    canonicalization: String,

    /// Domain selector
    #[arg(short = 's', long = "selector")]
    selector: String,

    /// Domain name
    #[arg(short = 'd', long = "domain")]
    domain: String,

    /// Colon separated list of headers to sign
    #[arg(short = 'h', long = "headers", default_value = "From:Subject:To:Date")]
    headers: String,

    /// Un-dot-stuff the input while reading it
    #[arg(short = 'u', long = "unstuff")]
    unstuff: bool,

    /// Print the final message with \n instead of \r\n line endings
    #[arg(short = 'n', long = "unix-newlines")]
    unix_newlines: bool,

    /// Only print the DKIM-Signature header, not the whole message
    #[arg(long = "hd")]
    header_only: bool,

    /// Location of the PEM encoded private key
    #[arg(long = "key")]
    key: PathBuf,

    #[arg(long = "help", action = clap::ArgAction::HelpLong)]
    help: Option<bool>,
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
    let pem = match std::fs::read_to_string(&args.key) {
        Ok(pem) => pem,
        Err(err) => {
            eprintln!("could not read private key: {}", err);
            exit(1);
        }
    };
    let private_key = match algorithm.parse_private_key(&pem) {
        Ok(key) => key,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    let logger = slog::Logger::root(slog::Discard, slog::o!());
    let signer = SignerBuilder::new()
        .with_signed_headers(args.headers.split(':'))
        .and_then(|builder| {
            builder
                .with_private_key(private_key)
                .with_algorithm(algorithm)
                .with_selector(&args.selector)
                .with_signing_domain(&args.domain)
                .with_canonicalization(&args.canonicalization)
                .with_unix_newlines(args.unix_newlines)
                .with_logger(&logger)
                .build()
        });
    let signer = match signer {
        Ok(signer) => signer,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    let stdin = io::stdin();
    let mut reader = NormalizingReader::new(stdin.lock());
    if args.unstuff {
        reader = reader.unstuff();
    }
    let mut input = match file_buffer(reader) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("{}", err);
            exit(2);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = if args.header_only {
        signer.signature_header(&mut input).and_then(|header| {
            let nl = if args.unix_newlines { "\n" } else { "\r\n" };
            write!(out, "{}{}", header, nl).map_err(Into::into)
        })
    } else {
        signer.sign_message(&mut input, &mut out)
    };
    if let Err(err) = result {
        eprintln!("{}", err);
        exit(2);
    }
}
