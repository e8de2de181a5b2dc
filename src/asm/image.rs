//! Text object-image format.
//!
//! An assembled cartridge image on disk is plain text: one tryte per line
//! as 9 glyphs, `;` starting a comment, blank lines ignored. The first
//! tryte is the word at the entry address `---------`.

use crate::ternary::{ParseTryteError, Tryte};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// Write an object image to disk.
pub fn save_image_file<P: AsRef<Path>>(path: P, image: &[Tryte]) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "; trine object image")?;
    writeln!(file, "; {} trytes, entry at ---------", image.len())?;
    writeln!(file)?;

    for (offset, word) in image.iter().enumerate() {
        writeln!(file, "{} ; {:05}", word, offset)?;
    }

    Ok(())
}

/// Read an object image from disk.
pub fn load_image_file<P: AsRef<Path>>(path: P) -> Result<Vec<Tryte>, ImageError> {
    let file = std::fs::File::open(path)?;
    parse_image(BufReader::new(file))
}

fn parse_image<R: BufRead>(reader: R) -> Result<Vec<Tryte>, ImageError> {
    let mut image = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let body = line.split(';').next().unwrap_or_default().trim();
        if body.is_empty() {
            continue;
        }

        let word = body
            .parse::<Tryte>()
            .map_err(|source| ImageError::Parse {
                line: index + 1,
                source,
            })?;
        image.push(word);
    }

    Ok(image)
}

/// Errors reading or writing image files.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: ParseTryteError,
    },
}
