//! Matrix persistence.
//!
//! Binary records are `rows` and `cols` as little-endian `u64` followed by the
//! `rows * cols` elements as little-endian `f64` in row-major order. Text records are a
//! `rows,cols` header line and one comma-separated line per row, with a blank line
//! between matrices.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::dimension::checked_size;
use crate::error::{IoErrorKind, MResult, MatrixError};
use crate::{BaseData, BaseDataMut, Matrix, MatrixData};

fn create(path: &Path) -> MResult<BufWriter<File>> {
    let file = File::create(path).map_err(|e| MatrixError::io(path, e))?;
    Ok(BufWriter::new(file))
}

fn open(path: &Path) -> MResult<(BufReader<File>, u64)> {
    let file = File::open(path).map_err(|e| MatrixError::io(path, e))?;
    let len = file.metadata().map_err(|e| MatrixError::io(path, e))?.len();
    Ok((BufReader::new(file), len))
}

fn write_record<W: Write, S: BaseData>(w: &mut W, m: &MatrixData<S>) -> io::Result<()> {
    w.write_u64::<LittleEndian>(m.row() as u64)?;
    w.write_u64::<LittleEndian>(m.col() as u64)?;
    for x in m.iter() {
        w.write_f64::<LittleEndian>(*x)?;
    }
    Ok(())
}

pub fn write_matrices_to_binary<'m, P, S, I>(path: P, matrices: I) -> MResult<()>
where
    P: AsRef<Path>,
    S: BaseData + 'm,
    I: IntoIterator<Item = &'m MatrixData<S>>,
{
    let path = path.as_ref();
    let mut w = create(path)?;
    let mut count = 0;
    for m in matrices {
        write_record(&mut w, m).map_err(|e| MatrixError::io(path, e))?;
        count += 1;
    }
    w.flush().map_err(|e| MatrixError::io(path, e))?;
    debug!("wrote {} matrices to {}", count, path.display());
    Ok(())
}

struct BinaryRecords<R> {
    r: R,
    remaining: u64,
    index: usize,
}

impl<R: BufRead> BinaryRecords<R> {
    fn truncated(&self, path: &Path) -> MatrixError {
        MatrixError::io(path, IoErrorKind::Truncated { index: self.index })
    }

    fn read_u64(&mut self, path: &Path) -> MResult<u64> {
        if self.remaining < 8 {
            return Err(self.truncated(path));
        }
        self.remaining -= 8;
        self.r
            .read_u64::<LittleEndian>()
            .map_err(|e| MatrixError::io(path, e))
    }

    /// Dimensions of the next record, `None` at a clean end of file.
    fn header(&mut self, path: &Path) -> MResult<Option<[usize; 2]>> {
        let at_end = self
            .r
            .fill_buf()
            .map_err(|e| MatrixError::io(path, e))?
            .is_empty();
        if at_end {
            return Ok(None);
        }
        let rows = self.read_u64(path)?;
        let cols = self.read_u64(path)?;
        match (usize::try_from(rows), usize::try_from(cols)) {
            (Ok(rows), Ok(cols)) if checked_size(rows, cols).is_some() => {
                Ok(Some([rows, cols]))
            }
            _ => Err(MatrixError::io(
                path,
                IoErrorKind::Malformed {
                    line: 0,
                    msg: format!("matrix #{} has shape {}x{}", self.index, rows, cols),
                },
            )),
        }
    }

    fn body(&mut self, path: &Path, n: usize) -> MResult<Vec<f64>> {
        if (n as u64).saturating_mul(8) > self.remaining {
            return Err(self.truncated(path));
        }
        let mut v = vec![0.0; n];
        self.r
            .read_f64_into::<LittleEndian>(&mut v)
            .map_err(|e| MatrixError::io(path, e))?;
        self.remaining -= n as u64 * 8;
        self.index += 1;
        Ok(v)
    }
}

/// Reads every record until the end of the file.
pub fn read_matrices_from_binary<P: AsRef<Path>>(path: P) -> MResult<Vec<Matrix>> {
    let path = path.as_ref();
    let (r, len) = open(path)?;
    let mut records = BinaryRecords {
        r,
        remaining: len,
        index: 0,
    };
    let mut out = Vec::new();
    while let Some([rows, cols]) = records.header(path)? {
        let v = records.body(path, rows * cols)?;
        out.push(Matrix::from_vec(rows, cols, v)?);
    }
    debug!("read {} matrices from {}", out.len(), path.display());
    Ok(out)
}

/// Reads one record per target, each of which must match the target's shape. Targets
/// are only written once every record has been read.
pub fn read_matrices_from_binary_into<'m, P, S, I>(path: P, targets: I) -> MResult<()>
where
    P: AsRef<Path>,
    S: BaseDataMut + 'm,
    I: IntoIterator<Item = &'m mut MatrixData<S>>,
{
    let path = path.as_ref();
    let targets: Vec<&mut MatrixData<S>> = targets.into_iter().collect();
    let (r, len) = open(path)?;
    let mut records = BinaryRecords {
        r,
        remaining: len,
        index: 0,
    };
    let mut bodies = Vec::with_capacity(targets.len());
    for (index, t) in targets.iter().enumerate() {
        let found = records
            .header(path)?
            .ok_or_else(|| MatrixError::io(path, IoErrorKind::Truncated { index }))?;
        if found != t.shape() {
            return Err(MatrixError::io(
                path,
                IoErrorKind::DimensionMismatch {
                    index,
                    expected: t.shape(),
                    found,
                },
            ));
        }
        bodies.push(records.body(path, t.size())?);
    }
    for (t, v) in targets.into_iter().zip(bodies) {
        t.as_slice_mut().copy_from_slice(&v);
    }
    debug!("read {} matrices from {}", records.index, path.display());
    Ok(())
}

fn write_txt_record<W: Write, S: BaseData>(w: &mut W, m: &MatrixData<S>) -> io::Result<()> {
    writeln!(w, "{},{}", m.row(), m.col())?;
    let last = m.col().saturating_sub(1);
    for ([_, j], x) in m.dim().iter().zip(m.iter()) {
        write!(w, "{:?}", x)?;
        w.write_all(if j == last { b"\n" } else { b"," })?;
    }
    Ok(())
}

pub fn write_matrices_to_txt<'m, P, S, I>(path: P, matrices: I) -> MResult<()>
where
    P: AsRef<Path>,
    S: BaseData + 'm,
    I: IntoIterator<Item = &'m MatrixData<S>>,
{
    let path = path.as_ref();
    let mut w = create(path)?;
    let mut count = 0;
    for m in matrices {
        if count > 0 {
            w.write_all(b"\n").map_err(|e| MatrixError::io(path, e))?;
        }
        write_txt_record(&mut w, m).map_err(|e| MatrixError::io(path, e))?;
        count += 1;
    }
    w.flush().map_err(|e| MatrixError::io(path, e))?;
    debug!("wrote {} matrices to {}", count, path.display());
    Ok(())
}

fn malformed(path: &Path, line: usize, msg: String) -> MatrixError {
    MatrixError::io(path, IoErrorKind::Malformed { line, msg })
}

/// Parses a `rows,cols` line. Every element takes at least two bytes of the file, so a
/// header asking for more than `file_len / 2` elements cannot be satisfied.
fn parse_header(path: &Path, line: usize, s: &str, file_len: u64) -> MResult<[usize; 2]> {
    let mut it = s.split(',').map(|x| x.trim().parse::<usize>());
    let (rows, cols) = match (it.next(), it.next(), it.next()) {
        (Some(Ok(rows)), Some(Ok(cols)), None) => (rows, cols),
        _ => return Err(malformed(path, line, format!("bad header {:?}", s))),
    };
    match checked_size(rows, cols) {
        Some(n) if n as u64 <= file_len / 2 => Ok([rows, cols]),
        _ => Err(malformed(
            path,
            line,
            format!("{}x{} does not fit in {} bytes", rows, cols, file_len),
        )),
    }
}

pub fn read_matrices_from_txt<P: AsRef<Path>>(path: P) -> MResult<Vec<Matrix>> {
    let path = path.as_ref();
    let (r, file_len) = open(path)?;
    let mut lines = r.lines().enumerate().map(|(i, l)| (i + 1, l));
    let mut out = Vec::new();
    while let Some((no, line)) = lines.next() {
        let line = line.map_err(|e| MatrixError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let [rows, cols] = parse_header(path, no, &line, file_len)?;
        let mut v = Vec::with_capacity(rows * cols);
        if cols > 0 {
            for i in 0..rows {
                let (no, line) = match lines.next() {
                    Some((no, l)) => (no, l.map_err(|e| MatrixError::io(path, e))?),
                    None => {
                        return Err(malformed(
                            path,
                            no + i + 1,
                            format!("expected {} rows, got {}", rows, i),
                        ))
                    }
                };
                let start = v.len();
                for x in line.split(',') {
                    let x = x.trim();
                    v.push(
                        x.parse::<f64>()
                            .map_err(|e| malformed(path, no, format!("{:?}: {}", x, e)))?,
                    );
                }
                if v.len() - start != cols {
                    return Err(malformed(
                        path,
                        no,
                        format!("expected {} columns, got {}", cols, v.len() - start),
                    ));
                }
            }
        }
        out.push(Matrix::from_vec(rows, cols, v)?);
    }
    debug!("read {} matrices from {}", out.len(), path.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{init_test_logger, matrix, MatrixView};

    fn samples() -> Vec<Matrix> {
        vec![
            matrix![[1, 2], [3, 4]].unwrap(),
            matrix![[0.1, -2.5e-300, f64::MAX]].unwrap(),
            Matrix::new(0, 3).unwrap(),
            matrix![[1], [2], [3]].unwrap(),
        ]
    }

    #[test]
    fn test_binary_round_trip() {
        init_test_logger();
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        let ms = samples();
        write_matrices_to_binary(&path, &ms).unwrap();

        let expected_len: usize = ms.iter().map(|m| 16 + 8 * m.size()).sum();
        assert_eq!(fs::metadata(&path).unwrap().len() as usize, expected_len);
        assert_eq!(read_matrices_from_binary(&path).unwrap(), ms);
    }

    #[test]
    fn test_binary_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        let buf = [1.5, -2.0];
        let v = MatrixView::from_slice(1, 2, &buf).unwrap();
        write_matrices_to_binary(&path, [&v]).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &2u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[24..32], &(-2.0f64).to_le_bytes());
    }

    #[test]
    fn test_binary_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        write_matrices_to_binary(&path, &samples()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let e = read_matrices_from_binary(&path).unwrap_err();
        assert!(e.is_io());
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Truncated { index: 3 })
        ));
    }

    #[test]
    fn test_binary_bad_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(&2u64.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        let e = read_matrices_from_binary(&path).unwrap_err();
        assert!(matches!(e.io_kind(), Some(IoErrorKind::Malformed { .. })));
    }

    #[test]
    fn test_binary_into() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        let ms = samples();
        write_matrices_to_binary(&path, &ms).unwrap();

        let mut a = Matrix::new(2, 2).unwrap();
        let mut b = Matrix::new(1, 3).unwrap();
        read_matrices_from_binary_into(&path, [&mut a, &mut b]).unwrap();
        assert_eq!(a, ms[0]);
        assert_eq!(b, ms[1]);

        let mut a = Matrix::new(2, 2).unwrap();
        let mut wrong = Matrix::new(3, 1).unwrap();
        let e = read_matrices_from_binary_into(&path, [&mut a, &mut wrong]).unwrap_err();
        match e.io_kind() {
            Some(IoErrorKind::DimensionMismatch {
                index,
                expected,
                found,
            }) => {
                assert_eq!(*index, 1);
                assert_eq!(*expected, [3, 1]);
                assert_eq!(*found, [1, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
        // nothing is written on failure
        assert!(a.is_zeros());

        let mut more: Vec<Matrix> = (0..5).map(|_| Matrix::default()).collect();
        more[0] = Matrix::new(2, 2).unwrap();
        more[1] = Matrix::new(1, 3).unwrap();
        more[2] = Matrix::new(0, 3).unwrap();
        more[3] = Matrix::new(3, 1).unwrap();
        let e = read_matrices_from_binary_into(&path, more.iter_mut()).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Truncated { index: 4 })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let e = read_matrices_from_binary(&path).unwrap_err();
        assert!(matches!(e.io_kind(), Some(IoErrorKind::Stream(_))));
        assert!(e.message().contains("missing.bin"));
        assert!(read_matrices_from_txt(&path).is_err());
    }

    #[test]
    fn test_txt_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let ms = samples();
        write_matrices_to_txt(&path, &ms).unwrap();
        assert_eq!(read_matrices_from_txt(&path).unwrap(), ms);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("2,2\n1.0,2.0\n3.0,4.0\n\n1,3\n"));
    }

    #[test]
    fn test_txt_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.csv");

        fs::write(&path, "2,2\n1,2\n3,x\n").unwrap();
        let e = read_matrices_from_txt(&path).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Malformed { line: 3, .. })
        ));

        fs::write(&path, "2,2\n1,2\n").unwrap();
        let e = read_matrices_from_txt(&path).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Malformed { line: 3, .. })
        ));

        fs::write(&path, "1,2\n1,2,3\n").unwrap();
        let e = read_matrices_from_txt(&path).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Malformed { line: 2, .. })
        ));

        fs::write(&path, "1000000000000,1000\n1\n").unwrap();
        let e = read_matrices_from_txt(&path).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Malformed { line: 1, .. })
        ));

        fs::write(&path, "3,3\n1,2,3\n").unwrap();
        let e = read_matrices_from_txt(&path).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Malformed { line: 1, .. })
        ));

        fs::write(&path, "\n\nnot a header\n").unwrap();
        let e = read_matrices_from_txt(&path).unwrap_err();
        assert!(matches!(
            e.io_kind(),
            Some(IoErrorKind::Malformed { line: 3, .. })
        ));
    }
}
