use std::sync::LazyLock;

use regex::Regex;

use crate::domain::entity::catalog_schema::ColumnKind;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?([0-9]+)(?:\.([0-9]+))?$").expect("number pattern is valid"));

/// CellValue は列の型に従って解析された CSV セルの値。
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Number(f64),
    /// 最小通貨単位の金額。
    Currency(i64),
    MultiValue(Vec<String>),
}

/// CellParseError はセル値が列の型に合わない場合のエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellParseError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("'{0}' is not a whole number")]
    NotAnInteger(String),

    #[error("'{0}' must not be negative")]
    Negative(String),

    #[error("'{0}' has more than 2 decimal places")]
    TooManyDecimals(String),

    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

impl CellValue {
    /// 生のセル文字列を列の型に従って解析する。前後の空白は無視し、空文字列は Empty になる。
    pub fn parse(raw: &str, kind: &ColumnKind) -> Result<Self, CellParseError> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(Self::Empty);
        }
        match kind {
            ColumnKind::Text { .. } => Ok(Self::Text(value.to_string())),
            ColumnKind::Integer => parse_integer(value).map(Self::Integer),
            ColumnKind::Number => parse_number(value).map(Self::Number),
            ColumnKind::Currency => parse_currency(value).map(Self::Currency),
            ColumnKind::Options { .. } => {
                let values = split_multi_value(value);
                if values.is_empty() {
                    Ok(Self::Empty)
                } else {
                    Ok(Self::MultiValue(values))
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// 10 進表記の数値を解析する。指数表記・桁区切り・ロケール依存の小数点は受け付けない。
pub fn parse_number(value: &str) -> Result<f64, CellParseError> {
    if !NUMBER_RE.is_match(value) {
        return Err(CellParseError::NotANumber(value.to_string()));
    }
    value
        .parse::<f64>()
        .map_err(|_| CellParseError::NotANumber(value.to_string()))
}

/// 非負整数を解析する。
pub fn parse_integer(value: &str) -> Result<i64, CellParseError> {
    let caps = NUMBER_RE
        .captures(value)
        .ok_or_else(|| CellParseError::NotANumber(value.to_string()))?;
    if caps.get(2).is_some() {
        return Err(CellParseError::NotAnInteger(value.to_string()));
    }
    if value.starts_with('-') {
        return Err(CellParseError::Negative(value.to_string()));
    }
    value
        .trim_start_matches('+')
        .parse::<i64>()
        .map_err(|_| CellParseError::OutOfRange(value.to_string()))
}

/// 金額を最小通貨単位に変換する（小数点以下 2 桁まで、非負）。
pub fn parse_currency(value: &str) -> Result<i64, CellParseError> {
    let caps = NUMBER_RE
        .captures(value)
        .ok_or_else(|| CellParseError::NotANumber(value.to_string()))?;
    if value.starts_with('-') {
        return Err(CellParseError::Negative(value.to_string()));
    }
    let whole = caps.get(1).map_or("", |m| m.as_str());
    let fraction = caps.get(2).map_or("", |m| m.as_str());
    if fraction.len() > 2 {
        return Err(CellParseError::TooManyDecimals(value.to_string()));
    }

    let out_of_range = || CellParseError::OutOfRange(value.to_string());
    let whole: i64 = whole.parse().map_err(|_| out_of_range())?;
    let cents: i64 = format!("{fraction:0<2}").parse().map_err(|_| out_of_range())?;
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(cents))
        .ok_or_else(out_of_range)
}

/// 複数値セルをカンマで分割する。各値は前後空白を除去し、空の断片は捨てる。
pub fn split_multi_value(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect()
}
