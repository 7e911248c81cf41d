//! Text load/save in the `rows cols` + fixed 4-decimal layout.

use std::fmt::Write as _;
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

use crate::matrix::element_count;
use crate::{Error, Matrix};

/// Parses a matrix from its text form.
pub fn parse_matrix(text: &str) -> Result<Matrix, Error> {
    let mut tokens = Tokens {
        inner: text.split_whitespace(),
        position: 0,
    };
    let rows: usize = tokens.next_parsed()?;
    let cols: usize = tokens.next_parsed()?;

    let len = element_count(rows, cols)?;

    // Every value needs at least one byte plus a separator.
    let mut data = Vec::with_capacity(len.min(text.len() / 2 + 1));
    for _ in 0..len {
        data.push(tokens.next_parsed::<f64>()?);
    }

    let trailing = tokens.inner.count();
    if trailing > 0 {
        return Err(Error::TrailingData(trailing));
    }
    Matrix::new(rows, cols, data)
}

/// Formats a matrix the way [`save_matrix`] writes it.
pub fn format_matrix(matrix: &Matrix) -> String {
    let mut out = String::with_capacity(16 + matrix.len() * 10);
    let _ = writeln!(out, "{} {}", matrix.rows(), matrix.cols());
    for row in matrix.to_rows() {
        for value in row {
            let _ = write!(out, "{value:.4} ");
        }
        out.push('\n');
    }
    out
}

pub fn load_matrix(path: impl AsRef<Path>) -> Result<Matrix, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix(&text)
}

/// Writes `matrix` to `path`, creating parent directories as needed.
pub fn save_matrix(matrix: &Matrix, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, format_matrix(matrix)).map_err(io_err)
}

struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
    position: usize,
}

impl Tokens<'_> {
    fn next_parsed<T>(&mut self) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let position = self.position;
        let token = self.inner.next().ok_or(Error::MissingToken(position))?;
        self.position += 1;
        token.parse().map_err(|e: T::Err| Error::InvalidToken {
            position,
            token: token.to_string(),
            reason: e.to_string(),
        })
    }
}
