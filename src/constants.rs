//! Fixed source column labels and defaults shared across the crate.
//!
//! The labels are copied verbatim from the published workbook, including the
//! embedded `\r\n` line breaks and circled-number prefixes. They are matched
//! as opaque strings.

pub const LABEL_DRUG_CATEGORY: &str = "①薬剤区分";
pub const LABEL_THERAPEUTIC_CATEGORY: &str = "②薬効分類\r\n（保険薬収載時点の薬効分類を記載）";
pub const LABEL_INGREDIENT_NAME: &str = "③成分名";
pub const LABEL_PACKAGE_UNIT: &str = "④規格単位\r\n※全角";
pub const LABEL_YJ_CODE: &str = "⑤YJコード";
pub const LABEL_PRODUCT_NAME: &str = "⑥品名\r\n（承認書に記載の正式名称）\r\n※全角";
pub const LABEL_MANUFACTURER: &str = "⑦製造販売業者名";
pub const LABEL_PRODUCT_TYPE: &str = "⑧製品区分";
pub const LABEL_IS_BASIC_DRUG: &str = "⑨基礎的\r\n医薬品";
pub const LABEL_IS_STABLE_SUPPLY_DRUG: &str = "⑩安定確保医薬品";
pub const LABEL_LISTING_DATE: &str = "⑪薬価収載年月日";
pub const LABEL_SHIPPING_STATUS: &str = "⑫製造販売業者の\r\n「出荷対応」の状況";
pub const LABEL_STATUS_UPDATE_DATE: &str = "⑬当該品目の⑫の情報を更新した日（本項目を報告内容として追加した令和7年5月13日以降に⑫の情報を更新した品目についてのみ記載）";
pub const LABEL_REASON: &str = "⑭限定出荷/供給停止の理由\r\n";
pub const LABEL_RESOLUTION_ESTIMATE: &str = "⑮限定出荷の解除見込み／\r\n供給停止の解消見込み";
pub const LABEL_RESOLUTION_OR_DISCONTINUATION_DATE: &str =
    "⑯限定出荷の解除見込み／\r\n供給停止の解消見込み／\r\n販売中止品の在庫消尽時期";
pub const LABEL_SHIPMENT_VOLUME_STATUS: &str = "⑰製造販売業者の\r\n「出荷量」の現在の状況";
pub const LABEL_SHIPMENT_VOLUME_IMPROVEMENT_DATE: &str =
    "⑱製造販売業者の「出荷量」の改善（増加）見込み時期";
pub const LABEL_SHIPMENT_VOLUME_IMPROVEMENT_AMOUNT: &str =
    "⑲⑱を任意選択した場合の「出荷量」の改善（増加）見込み量";
pub const LABEL_OTHER_INFO_UPDATE_DATE: &str = "⑳当該品目の⑫以外の情報を更新した日";
pub const LABEL_IS_NEW: &str = "今回掲載時の更新有無（更新有りの場合、Newと表示）";
pub const LABEL_IS_NEW_SHORT: &str = "更新有無（更新有りの場合、Newと表示）";

/// Cell values in date columns that mean "not yet determined" or "not listed".
pub const DATE_SENTINELS: [&str; 3] = ["未定", "-", "薬価基準未収載"];

/// Rows above the label row (a title line in the published workbook).
pub const DEFAULT_HEADER_OFFSET: usize = 1;

pub const DEFAULT_BASE_URL: &str = "https://www.mhlw.go.jp/content/10800000/";
pub const DEFAULT_FILE_SUFFIX: &str = "iyakuhinkyoukyu.xlsx";
pub const DEFAULT_TABLE: &str = "MedicineShippingConditions";
pub const DEFAULT_STORE_PATH: &str = "data/medsupply.db";
pub const DEFAULT_CONFIG_PATH: &str = "medsupply.toml";

/// Every five minutes.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
/// Asia/Tokyo, which observes no daylight saving time.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_LEASE_TTL_SECS: i64 = 15 * 60;
pub const LEASE_NAME: &str = "snapshot";

/// Log target for per-run status lines, routed to its own file.
pub const STATUS_TARGET: &str = "medsupply::status";
