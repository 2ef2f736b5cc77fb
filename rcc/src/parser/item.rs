//! Item parsing

use super::tokens::{delim, ident, kw, op, sep, P};
use crate::ast::{
    Block, ConstItem, EnumDef, Expr, Function, ImplBlock, Item, ItemKind, Param, Path, Pattern,
    SelfParam, StructDef, StructField, TraitDef, Type, TypeAlias,
};
use crate::parsec::Parser;

/// Build the item grammar. `item` is the lazy handle for nested items in
/// traits and impl blocks.
pub fn item_parser(
    item: &P<Item>,
    expr: &P<Expr>,
    block: &P<Block>,
    pattern: &P<Pattern>,
    ty: &P<Type>,
    path: &P<Path>,
) -> P<Item> {
    let comma = sep(",");

    // `pattern : type`
    let param = pattern.and_then(&sep(":")).and_then(ty).map(|((pat, _), t)| {
        let span = pat.span.merge(t.span);
        Param {
            pattern: pat,
            ty: t,
            span,
        }
    });

    // `self`, `mut self`, `&self`, `&mut self`
    let self_param = op("&")
        .and_then(&kw("mut").optional())
        .and_then(&kw("self"))
        .map(|((_, m), _)| SelfParam {
            is_reference: true,
            is_mutable: m.is_some(),
        })
        .or_else(&kw("mut").and_then(&kw("self")).map(|_| SelfParam {
            is_reference: false,
            is_mutable: true,
        }))
        .or_else(&kw("self").map(|_| SelfParam {
            is_reference: false,
            is_mutable: false,
        }));

    // A leading self receiver is consumed separately from the positional list
    let params_list = {
        let self_param = self_param.clone();
        let positional = param.sep_by_trailing(&comma);
        let comma = comma.clone();
        Parser::new(move |ctx| {
            let receiver = self_param.parse(ctx).ok();
            let params = if receiver.is_some() {
                if comma.parse(ctx).is_ok() {
                    positional.parse(ctx)?
                } else {
                    Vec::new()
                }
            } else {
                positional.parse(ctx)?
            };
            Ok((receiver, params))
        })
    };

    // fn name(params) (-> ty)? ( ; | block )
    let fn_body = block
        .map(|b| {
            let span = b.span;
            (Some(b), span)
        })
        .or_else(&sep(";").map(|t| (None, t.span)));
    let function = kw("fn")
        .and_then(&ident())
        .and_then(&delim("("))
        .and_then(&params_list)
        .and_then(&delim(")"))
        .and_then(&op("->").and_then(ty).optional())
        .and_then(&fn_body)
        .map(
            |((((((fn_tok, name), _), (self_param, params)), _), ret), (body, end_span))| {
                Item::new(
                    ItemKind::Function(Function {
                        name,
                        self_param,
                        params,
                        return_type: ret.map(|(_, t)| t),
                        body,
                    }),
                    fn_tok.span.merge(end_span),
                )
            },
        );

    // struct name ( ; | { fields } )
    let struct_field = ident().and_then(&sep(":")).and_then(ty).map(|((name, _), t)| StructField {
        name,
        ty: t,
    });
    let struct_tail = sep(";")
        .map(|t| (Vec::new(), t.span))
        .or_else(
            &delim("{")
                .and_then(&struct_field.sep_by_trailing(&comma))
                .and_then(&delim("}"))
                .map(|((_, fields), r)| (fields, r.span)),
        );
    let struct_item = kw("struct")
        .and_then(&ident())
        .and_then(&struct_tail)
        .map(|((struct_tok, name), (fields, end))| {
            Item::new(
                ItemKind::Struct(StructDef { name, fields }),
                struct_tok.span.merge(end),
            )
        });

    // enum name { variants }
    let enum_item = kw("enum")
        .and_then(&ident())
        .and_then(&delim("{"))
        .and_then(&ident().sep_by_trailing(&comma))
        .and_then(&delim("}"))
        .map(|((((enum_tok, name), _), variants), r)| {
            Item::new(
                ItemKind::Enum(EnumDef { name, variants }),
                enum_tok.span.merge(r.span),
            )
        });

    // const NAME: ty = expr;
    let const_item = kw("const")
        .and_then(&ident())
        .and_then(&sep(":"))
        .and_then(ty)
        .and_then(&op("="))
        .and_then(expr)
        .and_then(&sep(";"))
        .map(|((((((const_tok, name), _), t), _), value), semi)| {
            Item::new(
                ItemKind::Const(ConstItem { name, ty: t, value }),
                const_tok.span.merge(semi.span),
            )
        });

    // trait Name { items }
    let trait_item = kw("trait")
        .and_then(&ident())
        .and_then(&delim("{"))
        .and_then(&item.many())
        .and_then(&delim("}"))
        .map(|((((trait_tok, name), _), items), r)| {
            Item::new(
                ItemKind::Trait(TraitDef { name, items }),
                trait_tok.span.merge(r.span),
            )
        });

    // impl (Trait for)? Type { items }
    let trait_head = {
        let path = path.clone();
        path.and_then(&kw("for")).map(|(p, _)| p)
    };
    let impl_item = kw("impl")
        .and_then(&trait_head.optional())
        .and_then(ty)
        .and_then(&delim("{"))
        .and_then(&item.many())
        .and_then(&delim("}"))
        .map(|(((((impl_tok, trait_path), self_ty), _), items), r)| {
            Item::new(
                ItemKind::Impl(ImplBlock {
                    trait_path,
                    self_ty,
                    items,
                }),
                impl_tok.span.merge(r.span),
            )
        });

    // type Alias = ty;
    let type_alias = kw("type")
        .and_then(&ident())
        .and_then(&op("="))
        .and_then(ty)
        .and_then(&sep(";"))
        .map(|((((type_tok, name), _), t), semi)| {
            Item::new(
                ItemKind::TypeAlias(TypeAlias { name, ty: t }),
                type_tok.span.merge(semi.span),
            )
        });

    function
        .or_else(&struct_item)
        .or_else(&enum_item)
        .or_else(&const_item)
        .or_else(&trait_item)
        .or_else(&impl_item)
        .or_else(&type_alias)
        .label("item")
        .context("item")
}
