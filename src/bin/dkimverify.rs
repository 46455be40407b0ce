//! Verifies the DKIM signatures of the given files (or stdin), looking keys
//! up in the DNS unless a TXT record file is supplied. The exit status is the
//! number of inputs that failed to verify.

use std::io::Read;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use maildkim::normalize::{file_buffer, NormalizingReader};
use maildkim::{
    decode_dns_txt, verify_message, verify_message_with_key, Algorithm, DKIMError, DKIMResult,
    DkimPublicKey, Status,
};

#[derive(Parser)]
#[command(name = "dkimverify", about = "Verify DKIM signatures")]
struct Args {
    /// Use the DKIM TXT record (or PEM public key) in this file instead of
    /// querying the DNS
    #[arg(long = "txt")]
    txt: Option<PathBuf>,

    /// Emit a "<name>: Pass/Fail" header on stdout instead of reporting on
    /// stderr
    #[arg(long = "hd")]
    header_name: Option<String>,

    /// Message files; stdin is read when none are given
    files: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    let public_key = args.txt.as_ref().map(|path| {
        let record = match std::fs::read_to_string(path) {
            Ok(record) => record,
            Err(err) => {
                eprintln!("could not read TXT record: {}", err);
                exit(1);
            }
        };
        let record = record.trim();
        let parsed = if record.starts_with("-----BEGIN") {
            Algorithm::RsaSha256
                .parse_public_key(record)
                .or_else(|_| Algorithm::Ed25519Sha256.parse_public_key(record))
        } else {
            decode_dns_txt(record)
        };
        match parsed {
            Ok(key) => key,
            Err(err) => {
                eprintln!("{}", err);
                exit(1);
            }
        }
    });

    let logger = slog::Logger::root(slog::Discard, slog::o!());
    let mut failures = 0;

    if args.files.is_empty() {
        let stdin = std::io::stdin();
        let result = verify_input(&runtime, &logger, stdin.lock(), public_key.as_ref());
        report(&args, "<stdin>", result, &mut failures);
    } else {
        for path in &args.files {
            let file = match std::fs::File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("{}: {}", path.display(), err);
                    failures += 1;
                    continue;
                }
            };
            let result = verify_input(&runtime, &logger, file, public_key.as_ref());
            report(&args, &path.display().to_string(), result, &mut failures);
        }
    }

    exit(failures);
}

fn verify_input<R: Read>(
    runtime: &tokio::runtime::Runtime,
    logger: &slog::Logger,
    input: R,
    public_key: Option<&DkimPublicKey>,
) -> Result<(), DKIMError> {
    let mut buffered = file_buffer(NormalizingReader::new(input))?;
    match public_key {
        Some(key) => verify_message_with_key(logger, &mut buffered, key),
        None => runtime.block_on(verify_message(logger, &mut buffered)),
    }
}

fn report(args: &Args, input: &str, result: Result<(), DKIMError>, failures: &mut i32) {
    let result = DKIMResult::from(result);
    if let Some(err) = result.error() {
        *failures += 1;
        match &args.header_name {
            // Header mode stays quiet when there is nothing to authenticate
            // or the answer might change on retry.
            Some(name) => {
                let suppress =
                    matches!(err, DKIMError::NoSignature) || err.status() == Status::Temporary;
                if !suppress {
                    println!("{}: {}", name, result.summary());
                }
            }
            None => eprintln!("{}: {}", input, err),
        }
    } else if let Some(name) = &args.header_name {
        println!("{}: {}", name, result.summary());
    }
}
