//! 股票列表上传校验与解析
//!
//! 服务端和客户端共用：客户端在发起请求前做同样的文件校验

use std::collections::HashSet;
use std::path::Path;

use crate::error::{BatchError, Result};

/// 上传文件大小上限（1 MiB）
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// 允许的文件扩展名
pub const ALLOWED_EXTENSIONS: &[&str] = &["txt"];

/// 错误信息里最多列出的非法行数
const MAX_REPORTED_LINES: usize = 5;

/// 股票代码必须是 6 位 ASCII 数字
pub fn is_valid_stock_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_stock_code(code: &str) -> Result<()> {
    if is_valid_stock_code(code) {
        Ok(())
    } else {
        Err(BatchError::InvalidInput(format!(
            "股票代码格式错误: {}（需为6位数字）",
            code
        )))
    }
}

pub fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// 校验上传文件：必须存在、为 .txt、非空且不超过 `max_bytes`
pub fn validate_upload(filename: Option<&str>, size: usize, max_bytes: usize) -> Result<()> {
    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BatchError::InvalidInput("未选择股票列表文件".to_string()))?;

    if !has_allowed_extension(filename) {
        return Err(BatchError::InvalidInput(format!(
            "仅支持上传 .txt 文本文件: {}",
            filename
        )));
    }
    if size == 0 {
        return Err(BatchError::InvalidInput("股票列表文件为空".to_string()));
    }
    if size > max_bytes {
        return Err(BatchError::InvalidInput(format!(
            "文件大小超过限制: {} 字节（最大 {} 字节）",
            size, max_bytes
        )));
    }
    Ok(())
}

/// 解码上传内容
///
/// 优先按 UTF-8（去掉 BOM）解析，失败时按 GBK 解析，兼容老版本行情软件导出的列表
pub fn decode_stock_list(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::GBK.decode(bytes);
            if had_errors {
                log::warn!("股票列表既不是 UTF-8 也不是合法的 GBK 编码，已替换无法识别的字符");
            }
            text.into_owned()
        }
    }
}

/// 读取服务端预置的股票列表文件
///
/// 只保留整行恰好是 6 位数字的行，其余内容忽略；文件不存在时返回空列表
pub async fn load_stock_list_file(path: &Path) -> Result<Vec<String>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("股票列表文件不存在: {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let codes: Vec<String> = decode_stock_list(&bytes)
        .lines()
        .map(str::trim)
        .filter(|line| is_valid_stock_code(line))
        .map(str::to_string)
        .collect();
    log::info!("股票列表加载完成: {} 只", codes.len());
    Ok(codes)
}

/// 解析股票列表
///
/// 每行一只股票，取行首字段作为代码，其后的名称等内容忽略（如 `600519 贵州茅台`）。
/// 空行跳过，重复代码只保留第一次出现的位置。任何一行格式错误都会拒绝整个列表。
pub fn parse_stock_list(text: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut codes = Vec::new();
    let mut invalid = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let token = line
            .split(|c: char| c.is_whitespace() || c == ',' || c == '，')
            .find(|token| !token.is_empty());

        let Some(code) = token else {
            continue;
        };

        if !is_valid_stock_code(code) {
            invalid.push(format!("第{}行 \"{}\"", index + 1, code));
            continue;
        }

        if seen.insert(code) {
            codes.push(code.to_string());
        }
    }

    if !invalid.is_empty() {
        let more = invalid.len().saturating_sub(MAX_REPORTED_LINES);
        let mut message = format!(
            "股票代码格式错误（需为6位数字）: {}",
            invalid
                .iter()
                .take(MAX_REPORTED_LINES)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        if more > 0 {
            message.push_str(&format!(" 等另外 {} 行", more));
        }
        return Err(BatchError::InvalidInput(message));
    }

    if codes.is_empty() {
        return Err(BatchError::InvalidInput("股票列表为空".to_string()));
    }

    log::info!("股票列表解析完成: {} 只", codes.len());
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_code_boundaries() {
        assert!(is_valid_stock_code("005930"));
        assert!(is_valid_stock_code("600519"));
        assert!(!is_valid_stock_code("59300"));
        assert!(!is_valid_stock_code("00593a"));
        assert!(!is_valid_stock_code("0059300"));
        assert!(!is_valid_stock_code("００５９３０"));
        assert!(validate_stock_code("59300").is_err());
    }

    #[test]
    fn test_upload_size_boundary() {
        assert!(validate_upload(Some("list.txt"), MAX_UPLOAD_BYTES, MAX_UPLOAD_BYTES).is_ok());

        let err = validate_upload(Some("list.txt"), MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES)
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidInput(_)));
    }

    #[test]
    fn test_upload_file_checks() {
        assert!(validate_upload(None, 10, MAX_UPLOAD_BYTES).is_err());
        assert!(validate_upload(Some("  "), 10, MAX_UPLOAD_BYTES).is_err());
        assert!(validate_upload(Some("list.csv"), 10, MAX_UPLOAD_BYTES).is_err());
        assert!(validate_upload(Some("list"), 10, MAX_UPLOAD_BYTES).is_err());
        assert!(validate_upload(Some("list.txt"), 0, MAX_UPLOAD_BYTES).is_err());
        assert!(validate_upload(Some("LIST.TXT"), 10, MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn test_parse_stock_list() {
        let text = "005930\n\n  000660 SK海力士\r\n600519,贵州茅台\n005930\n";
        let codes = parse_stock_list(text).unwrap();
        assert_eq!(codes, vec!["005930", "000660", "600519"]);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        let err = parse_stock_list("005930\n59300\n00593a\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("第2行"), "{}", message);
        assert!(message.contains("第3行"), "{}", message);

        assert!(parse_stock_list("\n   \n").is_err());
    }

    #[test]
    fn test_decode_gbk_and_bom() {
        let (gbk, _, _) = encoding_rs::GBK.encode("600519 贵州茅台\n000001 平安银行\n");
        let text = decode_stock_list(&gbk);
        assert!(text.contains("贵州茅台"));
        assert_eq!(parse_stock_list(&text).unwrap(), vec!["600519", "000001"]);

        let with_bom = b"\xEF\xBB\xBF005930\n";
        assert_eq!(parse_stock_list(&decode_stock_list(with_bom)).unwrap(), vec!["005930"]);
    }

    #[tokio::test]
    async fn test_load_stock_list_file() {
        let path = std::env::temp_dir().join(format!("chart-batch-stocks-{}.txt", std::process::id()));
        std::fs::write(&path, "005930\n\n  000660  \n600519 贵州茅台\n12345\n035420\n").unwrap();

        let codes = load_stock_list_file(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(codes, vec!["005930", "000660", "035420"]);

        let missing = std::env::temp_dir().join("chart-batch-missing-stock-list.txt");
        assert!(load_stock_list_file(&missing).await.unwrap().is_empty());
    }
}
