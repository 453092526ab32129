use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use sejong_core::domain::receipt::{ReceiptFile, ReceiptMetadata};
use sejong_core::domain::request::RequestId;
use sejong_core::errors::{ApplicationError, DomainError};
use sejong_service::{ActionContext, LifecycleHandler, Session, TransitionReceipt};

use super::{CliRuntime, CommandResult};

pub struct ReceiptArgs {
    pub file: PathBuf,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub store: Option<String>,
    pub note: Option<String>,
}

fn applied(command: &str, receipt: &TransitionReceipt) -> CommandResult {
    CommandResult::success_with(
        command,
        format!("request `{}`: {}", receipt.id, receipt.status.display_status),
        serde_json::to_value(receipt).ok(),
    )
}

/// Online purchases: no receipt, optional final amount and date.
pub async fn purchase(
    rt: &CliRuntime,
    id: String,
    amount: Option<Decimal>,
    date: Option<NaiveDate>,
) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_purchase(rt, &ctx, id, amount, date).await;
    rt.finish("purchase", &ctx, result)
}

async fn run_purchase(
    rt: &CliRuntime,
    ctx: &ActionContext,
    id: String,
    amount: Option<Decimal>,
    date: Option<NaiveDate>,
) -> Result<CommandResult, ApplicationError> {
    rt.require_admin()?;
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.mark_purchased(ctx, &RequestId(id), amount, date).await?;
    Ok(applied("purchase", &receipt))
}

/// Offline purchases: upload the receipt image, record it, mark purchased.
/// Students may submit for their own requests; administrators for any.
pub async fn receipt(rt: &CliRuntime, id: String, args: ReceiptArgs) -> CommandResult {
    let ctx = rt.command_context();
    let result = run_receipt(rt, &ctx, id, args).await;
    rt.finish("receipt", &ctx, result)
}

async fn run_receipt(
    rt: &CliRuntime,
    ctx: &ActionContext,
    id: String,
    args: ReceiptArgs,
) -> Result<CommandResult, ApplicationError> {
    let id = RequestId(id);
    if let Session::Student { profile, .. } = rt.session()? {
        let owner = rt
            .context
            .requests
            .find_by_id(&id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
            .map(|request| request.user_id);
        if owner.map_or(false, |owner| owner != profile.id) {
            return Err(ApplicationError::Unauthorized(
                "students can only submit receipts for their own requests".to_string(),
            ));
        }
    }
    let file = read_receipt_file(&args.file)?;
    let metadata = ReceiptMetadata {
        purchase_date: args.date,
        total_amount: args.amount,
        purchase_store: args.store.filter(|store| !store.trim().is_empty()),
        note: args.note.filter(|note| !note.trim().is_empty()),
    };
    let handler = LifecycleHandler::new(rt.context.clone());
    let receipt = handler.submit_receipt(ctx, &id, file, metadata).await?;
    Ok(applied("receipt", &receipt))
}

fn read_receipt_file(path: &Path) -> Result<ReceiptFile, ApplicationError> {
    let bytes = fs::read(path).map_err(|error| {
        DomainError::InvariantViolation(format!(
            "could not read receipt file `{}`: {error}",
            path.display()
        ))
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receipt".to_string());
    let content_type = content_type_for(path).to_string();
    Ok(ReceiptFile { file_name, content_type, bytes })
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::content_type_for;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for(Path::new("scan.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("receipt.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("receipt")), "application/octet-stream");
    }
}
