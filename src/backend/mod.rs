pub mod http;
pub mod types;

use crate::sizes::SizeCatalog;
use anyhow::Result;

pub use types::{
    AutoAdjust, AutoAdjustRules, BgRemoveIn, BgRemoveOut, ComposeIn, ComposeOut, ComposePdfIn,
    ComposePdfOut, Margins, PctRange, Quality, Sheet, SheetItem, SheetType,
};

pub trait Backend {
    fn bg_remove(&self, req: &BgRemoveIn) -> Result<BgRemoveOut>;
    fn compose_final(&self, req: &ComposeIn) -> Result<ComposeOut>;
    fn compose_pdf(&self, req: &ComposePdfIn) -> Result<ComposePdfOut>;
    fn fetch_sizes(&self) -> Result<SizeCatalog>;
}
