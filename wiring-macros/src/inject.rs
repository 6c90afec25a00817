//! `#[derive(Inject)]` implementation.

use darling::{FromDeriveInput, FromField, ast, util::Ignored};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, DeriveInput, Expr, ExprLit, Generics, Ident, Lit, LitStr, Meta, Type};
use wiring_support::tag::parse_tag_strict;

#[derive(FromDeriveInput)]
#[darling(supports(struct_named))]
struct InjectInput {
    ident: Ident,
    generics: Generics,
    data: ast::Data<Ignored, InjectField>,
}

#[derive(FromField)]
#[darling(forward_attrs(ioc))]
struct InjectField {
    ident: Option<Ident>,
    ty: Type,
    attrs: Vec<Attribute>,
}

/// What the attributes on one field ask for.
struct FieldPlan {
    ident: Ident,
    ty: Type,
    tag: Option<ParsedTag>,
}

struct ParsedTag {
    name: String,
    omitempty: bool,
}

impl FieldPlan {
    fn settable(&self) -> bool {
        !matches!(self.ty, Type::Reference(_))
    }
}

pub fn derive_inject_impl(input: DeriveInput) -> TokenStream {
    let parsed = match InjectInput::from_derive_input(&input) {
        Ok(parsed) => parsed,
        Err(e) => return e.write_errors().into(),
    };

    match expand(parsed) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: InjectInput) -> syn::Result<TokenStream2> {
    let InjectInput { ident, generics, data } = input;
    let fields = data
        .take_struct()
        .map(|fields| fields.fields)
        .unwrap_or_default();

    let mut plans = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        plans.push(FieldPlan {
            tag: field_tag(&field.attrs)?,
            ident: field_ident,
            ty: field.ty,
        });
    }

    let descriptors = plans.iter().map(descriptor);
    let visits = plans.iter().enumerate().map(|(index, plan)| visit(index, plan));

    let mut generics = generics;
    {
        let where_clause = generics.make_where_clause();
        for plan in plans.iter().filter(|p| p.tag.is_some() && p.settable()) {
            let ty = &plan.ty;
            where_clause
                .predicates
                .push(syn::parse_quote!(#ty: ::core::clone::Clone + ::core::marker::Send + ::core::marker::Sync + 'static));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let injectable = quote! {
        impl #impl_generics ::wiring::Injectable for #ident #ty_generics #where_clause {
            fn descriptors() -> &'static [::wiring::InjectDescriptor] {
                const DESCRIPTORS: &[::wiring::InjectDescriptor] = &[#(#descriptors),*];
                DESCRIPTORS
            }

            fn inject_fields(
                &mut self,
                fields: &mut ::wiring::FieldInjector<'_>,
            ) -> ::wiring::Result<()> {
                #(#visits)*
                ::core::result::Result::Ok(())
            }
        }
    };

    // The link-time table only holds concrete types.
    let registration = if generics.params.is_empty() {
        quote! {
            ::wiring::__private::inventory::submit! {
                ::wiring::StructKind::of::<#ident>()
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        #injectable
        #registration
    })
}

fn field_tag(attrs: &[Attribute]) -> syn::Result<Option<ParsedTag>> {
    let mut found: Option<ParsedTag> = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("ioc")) {
        if found.is_some() {
            return Err(syn::Error::new_spanned(attr, "duplicate #[ioc] attribute"));
        }

        let raw = match &attr.meta {
            Meta::Path(_) => LitStr::new("", proc_macro2::Span::call_site()),
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit { lit: Lit::Str(tag), .. }) => tag.clone(),
                other => {
                    return Err(syn::Error::new_spanned(other, "expected a string tag, e.g. #[ioc = \"name\"]"));
                }
            },
            Meta::List(list) => list.parse_args::<LitStr>()?,
        };

        let value = raw.value();
        let tag = parse_tag_strict(&value).map_err(|e| syn::Error::new(raw.span(), e))?;
        found = Some(ParsedTag {
            name: tag.name.to_string(),
            omitempty: tag.omitempty,
        });
    }

    Ok(found)
}

fn descriptor(plan: &FieldPlan) -> TokenStream2 {
    let field = plan.ident.to_string();
    let settable = plan.settable();
    match &plan.tag {
        None => quote! { ::wiring::InjectDescriptor::skipped(#field) },
        Some(ParsedTag { name, omitempty }) => quote! {
            ::wiring::InjectDescriptor {
                field: #field,
                name: #name,
                optional: #omitempty,
                requested: true,
                settable: #settable,
            }
        },
    }
}

fn visit(index: usize, plan: &FieldPlan) -> TokenStream2 {
    let ident = &plan.ident;
    match (&plan.tag, plan.settable()) {
        (None, _) => quote! { fields.skip(#index); },
        (Some(_), true) => quote! { fields.inject(#index, &mut self.#ident)?; },
        (Some(_), false) => quote! { fields.unsettable(#index)?; },
    }
}
