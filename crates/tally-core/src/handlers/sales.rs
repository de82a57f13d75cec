//! Sales CSV handler.

use super::{Handler, HandlerError, Metrics, parse_blocking, read_input};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Metrics for a sales CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    /// Sum of `quantity * price` over valid rows.
    pub total_sales: f64,
    /// Distinct product names among valid rows.
    pub unique_products: usize,
    /// Rows that passed validation.
    pub valid_records: usize,
    /// Rows that were skipped.
    pub invalid_records: usize,
}

/// Handles `.csv` files with `product`, `quantity` and `price` columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct SalesHandler;

#[async_trait]
impl Handler for SalesHandler {
    async fn process(&self, path: &Path) -> Result<Metrics, HandlerError> {
        let content = read_input(path).await?;
        parse_blocking(content, |content| parse_sales(content).map(Metrics::Sales)).await
    }
}

struct Columns {
    product: usize,
    quantity: usize,
    price: usize,
}

fn locate_columns(headers: &csv::StringRecord) -> Result<Columns, HandlerError> {
    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let missing: Vec<&str> = ["product", "quantity", "price"]
        .into_iter()
        .filter(|name| find(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(HandlerError::Malformed(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    Ok(Columns {
        product: find("product").unwrap_or_default(),
        quantity: find("quantity").unwrap_or_default(),
        price: find("price").unwrap_or_default(),
    })
}

/// Parse sales CSV content.
///
/// Rows with a short/long field count, an empty product, a non-integer
/// quantity or a negative/non-numeric price are counted as invalid and skipped.
pub fn parse_sales(content: &str) -> Result<SalesMetrics, HandlerError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| HandlerError::Parse(format!("invalid CSV header: {}", e)))?
        .clone();
    let columns = locate_columns(&headers)?;

    let mut products = BTreeSet::new();
    let mut metrics = SalesMetrics {
        total_sales: 0.0,
        unique_products: 0,
        valid_records: 0,
        invalid_records: 0,
    };

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::UnequalLengths { .. }) => {
                metrics.invalid_records += 1;
                continue;
            }
            Err(e) => return Err(HandlerError::Parse(format!("invalid CSV: {}", e))),
        };

        let product = record.get(columns.product).unwrap_or_default();
        let quantity = record.get(columns.quantity).and_then(|q| q.parse::<u64>().ok());
        let price = record
            .get(columns.price)
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p >= 0.0);

        match (product.is_empty(), quantity, price) {
            (false, Some(quantity), Some(price)) => {
                metrics.total_sales += quantity as f64 * price;
                metrics.valid_records += 1;
                products.insert(product.to_string());
            }
            _ => metrics.invalid_records += 1,
        }
    }

    metrics.unique_products = products.len();
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_rows() {
        let content = "date,product,quantity,price\n\
                       2024-01-01,Widget,2,10.00\n\
                       2024-01-02,Gadget,1,5.50\n\
                       2024-01-03,Widget,3,10.00\n";
        let metrics = parse_sales(content).unwrap();
        assert_eq!(metrics.valid_records, 3);
        assert_eq!(metrics.invalid_records, 0);
        assert_eq!(metrics.unique_products, 2);
        assert!((metrics.total_sales - 55.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let content = "product,quantity,price\n\
                       Widget,two,10\n\
                       ,1,10\n\
                       Gadget,1,-4\n\
                       Gizmo,1\n\
                       Gizmo,1,3\n";
        let metrics = parse_sales(content).unwrap();
        assert_eq!(metrics.valid_records, 1);
        assert_eq!(metrics.invalid_records, 4);
        assert_eq!(metrics.unique_products, 1);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let content = "Product,QUANTITY,Price\nWidget,1,1.5\n";
        assert_eq!(parse_sales(content).unwrap().valid_records, 1);
    }

    #[test]
    fn test_missing_columns_is_malformed() {
        let err = parse_sales("product,amount\nWidget,3\n").unwrap_err();
        assert_eq!(err, HandlerError::Malformed("missing required columns: quantity, price".into()));
    }

    #[test]
    fn test_empty_file_is_malformed() {
        let err = parse_sales("").unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_handler_reports_missing_file() {
        let err = SalesHandler.process(Path::new("/nonexistent/sales.csv")).await.unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }
}
