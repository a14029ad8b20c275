mod mapped;

use proc_macro::TokenStream;

/// Derive macro for the `Mapped` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Mapped)]
/// #[mapped(table = "posts", prefix = "post")]
/// struct Post {
///     #[mapped(id)]
///     pub id: String,
///     #[mapped(hash)]
///     pub author: String,
///     #[mapped(range, name = "ts")]
///     pub created: String,
///     #[mapped(pair_hash = "byBoard")]
///     pub board: String,
///     #[mapped(pair_range = "byBoard")]
///     pub lanes: Vec<String>,
///     #[mapped(skip)]
///     pub draft: Option<String>,
/// }
/// ```
///
/// Struct attributes:
/// - `table = "..."` sets the table name. If omitted, defaults to snake_case
///   struct name + "s".
/// - `prefix = "..."` sets the data prefix. Defaults to the table name.
/// - `versioning = false` turns off optimistic version checks.
/// - `consistent = true` makes reads strongly consistent by default.
///
/// Field attributes:
/// - `id` marks the ID field. If omitted, a field named `id` is used.
/// - `hash`, `range` declare hash and range keys.
/// - `pair_hash = "name"`, `pair_range = "name"` add the field to a named
///   hash-range pair.
/// - `name = "..."` stores the field under a different physical attribute.
/// - `skip` leaves the field out of the declared columns.
///
/// Every other field is declared as a plain column.
#[proc_macro_derive(Mapped, attributes(mapped))]
pub fn derive_mapped(input: TokenStream) -> TokenStream {
    mapped::derive_mapped(input)
}
