use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitBool, LitStr};

pub fn derive_mapped(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

struct StructOptions {
    table: String,
    prefix: Option<String>,
    versioning: bool,
    consistent: bool,
}

#[derive(Default)]
struct FieldOptions {
    id: bool,
    hash: bool,
    range: bool,
    pair_hashes: Vec<String>,
    pair_ranges: Vec<String>,
    name: Option<String>,
    skip: bool,
}

impl FieldOptions {
    fn is_key(&self) -> bool {
        self.id || self.hash || self.range || !self.pair_hashes.is_empty() || !self.pair_ranges.is_empty()
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let options = struct_options(input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Mapped derive: only structs with named fields are supported",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Mapped derive: only structs are supported",
            ))
        }
    };

    let mut parsed = Vec::new();
    for field in fields {
        parsed.push((field, field_options(field)?));
    }

    // Default: a field named "id" when none is marked.
    if !parsed.iter().any(|(_, opts)| opts.id) {
        match parsed
            .iter_mut()
            .find(|(field, opts)| !opts.skip && field.ident.as_ref().is_some_and(|i| i == "id"))
        {
            Some((_, opts)) => opts.id = true,
            None => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Mapped derive: no field marked with #[mapped(id)] and no field named `id`",
                ))
            }
        }
    }

    let mut calls = Vec::new();
    for (field, opts) in &parsed {
        if opts.skip {
            if opts.is_key() {
                return Err(syn::Error::new_spanned(
                    field,
                    "Mapped derive: a skipped field cannot be a key",
                ));
            }
            continue;
        }
        let property = field_name(field);
        let spec = match &opts.name {
            Some(physical) => format!("{}#{}", physical, property),
            None => property,
        };

        if opts.id {
            calls.push(quote! { .id(#spec) });
        }
        if opts.hash {
            calls.push(quote! { .hash(#spec) });
        }
        if opts.range {
            calls.push(quote! { .range(#spec) });
        }
        for pair in &opts.pair_hashes {
            calls.push(quote! { .pair_hash(#pair, #spec) });
        }
        for pair in &opts.pair_ranges {
            calls.push(quote! { .pair_range(#pair, #spec) });
        }
        if !opts.is_key() {
            calls.push(quote! { .column(#spec) });
        }
    }

    let table = &options.table;
    let prefix = options
        .prefix
        .as_ref()
        .map(|prefix| quote! { .prefix(#prefix) });
    let versioning = options.versioning;
    let consistent = options.consistent;

    Ok(quote! {
        impl dynamap::Mapped for #name {
            fn schema() -> ::core::result::Result<dynamap::Schema, dynamap::SchemaError> {
                dynamap::Schema::builder(#table)
                    #prefix
                    #(#calls)*
                    .versioning(#versioning)
                    .strongly_consistent(#consistent)
                    .build()
            }
        }
    })
}

fn struct_options(input: &DeriveInput) -> syn::Result<StructOptions> {
    let mut options = StructOptions {
        table: format!("{}s", to_snake_case(&input.ident.to_string())),
        prefix: None,
        versioning: true,
        consistent: false,
    };

    for attr in &input.attrs {
        if !attr.path().is_ident("mapped") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                options.table = value.value();
            } else if meta.path.is_ident("prefix") {
                let value: LitStr = meta.value()?.parse()?;
                options.prefix = Some(value.value());
            } else if meta.path.is_ident("versioning") {
                let value: LitBool = meta.value()?.parse()?;
                options.versioning = value.value;
            } else if meta.path.is_ident("consistent") {
                let value: LitBool = meta.value()?.parse()?;
                options.consistent = value.value;
            } else {
                return Err(meta.error("unknown mapped attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("mapped") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                options.id = true;
            } else if meta.path.is_ident("hash") {
                options.hash = true;
            } else if meta.path.is_ident("range") {
                options.range = true;
            } else if meta.path.is_ident("skip") {
                options.skip = true;
            } else if meta.path.is_ident("pair_hash") {
                let value: LitStr = meta.value()?.parse()?;
                options.pair_hashes.push(value.value());
            } else if meta.path.is_ident("pair_range") {
                let value: LitStr = meta.value()?.parse()?;
                options.pair_ranges.push(value.value());
            } else if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                options.name = Some(value.value());
            } else {
                return Err(meta.error("unknown mapped field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(options)
}

fn field_name(field: &Field) -> String {
    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string().trim_start_matches("r#").to_string())
        .unwrap_or_default()
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
