// apps/vd_cli/src/snapshot_csv.rs

//! 快照 CSV 读写
//!
//! 每行是一个状态分量，每列是一个时间步（n 行 × M 列），无表头。
//! 空行和以注释前缀开头的行被跳过；任一数值无法解析即报错，并给出行号。

use std::fmt::Write as _;
use std::path::Path;

use nalgebra::DMatrix;
use vd_core::SnapshotMatrix;
use vd_foundation::{VdError, VdResult};

/// CSV 格式选项
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// 分隔符
    pub delimiter: char,
    /// 注释行前缀
    pub comment_prefix: Option<char>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            comment_prefix: Some('#'),
        }
    }
}

/// 从 CSV 文件加载快照矩阵
pub fn load_snapshots(path: &Path, options: &CsvOptions) -> VdResult<SnapshotMatrix> {
    let content = std::fs::read_to_string(path).map_err(|e| VdError::Io {
        message: format!("无法读取快照文件 {}: {e}", path.display()),
        source: Some(e),
    })?;
    parse_snapshots(&content, options)
}

/// 解析 CSV 文本
pub fn parse_snapshots(content: &str, options: &CsvOptions) -> VdResult<SnapshotMatrix> {
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(prefix) = options.comment_prefix {
            if line.starts_with(prefix) {
                continue;
            }
        }

        let row = line
            .split(options.delimiter)
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| {
                    VdError::invalid_input(format!(
                        "第 {} 行: 无法解析数值 '{}'",
                        line_num + 1,
                        field.trim()
                    ))
                })
            })
            .collect::<VdResult<Vec<f64>>>()?;

        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(VdError::invalid_input(format!(
                    "第 {} 行: 列数 {} 与首行列数 {} 不一致",
                    line_num + 1,
                    row.len(),
                    first.len()
                )));
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(VdError::invalid_input("快照文件中没有有效数据"));
    }

    let n = rows.len();
    let m = rows[0].len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    SnapshotMatrix::new(DMatrix::from_row_slice(n, m, &flat))
}

/// 写出快照矩阵
pub fn save_snapshots(path: &Path, snapshots: &SnapshotMatrix, options: &CsvOptions) -> VdResult<()> {
    let mut out = String::new();
    if let Some(prefix) = options.comment_prefix {
        let _ = writeln!(
            out,
            "{prefix} {} state components x {} time steps",
            snapshots.n_state(),
            snapshots.n_steps()
        );
    }
    for row in snapshots.as_matrix().row_iter() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:e}")).collect();
        let _ = writeln!(out, "{}", line.join(&options.delimiter.to_string()));
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let csv = "# header comment\n1.0, 2.0, 3.0\n\n4.0,5.0,6.0\n";
        let x = parse_snapshots(csv, &CsvOptions::default()).unwrap();
        assert_eq!(x.n_state(), 2);
        assert_eq!(x.n_steps(), 3);
        assert_eq!(x.as_matrix()[(1, 2)], 6.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let csv = "1,2,3\n4,5\n";
        let err = parse_snapshots(csv, &CsvOptions::default()).unwrap_err();
        assert!(err.to_string().contains("第 2 行"));
    }

    #[test]
    fn test_bad_number_rejected() {
        let csv = "1,2\n3,abc\n";
        assert!(parse_snapshots(csv, &CsvOptions::default()).is_err());
        assert!(parse_snapshots("# only comments\n", &CsvOptions::default()).is_err());
    }

    #[test]
    fn test_tab_delimiter() {
        let options = CsvOptions {
            delimiter: '\t',
            comment_prefix: None,
        };
        let x = parse_snapshots("1\t2\n3\t4\n", &options).unwrap();
        assert_eq!(x.as_matrix()[(1, 0)], 3.0);
    }

    #[test]
    fn test_save_then_load() {
        let x = SnapshotMatrix::new(DMatrix::from_fn(4, 3, |i, j| i as f64 * 0.1 - j as f64 / 3.0))
            .unwrap();
        let path = std::env::temp_dir().join(format!("vd_cli_snapshot_{}.csv", std::process::id()));
        save_snapshots(&path, &x, &CsvOptions::default()).unwrap();
        let loaded = load_snapshots(&path, &CsvOptions::default()).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.as_matrix(), x.as_matrix());
    }
}
