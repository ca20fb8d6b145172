/// Data layer: typed mammal records, loading, filtering, export.
///
/// Architecture:
/// ```text
///  built-in msleep / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader  │  parse file → MammalDataset
///   └──────────┘
///        │
///        ▼
///   ┌───────────────┐
///   │ MammalDataset │  Vec<Mammal>, factor levels
///   └───────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter  │  selected levels per factor → row indices
///   └──────────┘
///        │
///        ▼  (analysis)
///   ┌──────────┐
///   │  export  │  SummaryRecord rows → .csv / .json / .parquet
///   └──────────┘
/// ```

pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
