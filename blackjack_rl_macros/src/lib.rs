use proc_macro::TokenStream as TokenStream1;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote, ToTokens};

/// This macro is added before a method of a struct holding a
/// `current_game_phase: GamePhase` field. Use this macro to first check if the
/// current game phase is one of the phases in the attribute.
///
/// For example, `#[allowed_phase(AwaitingAction)]` will make a method first check
/// if current game phase is `AwaitingAction`, and `#[allowed_phase(AwaitingAction | Terminated)]`
/// accepts either of them. If not, the method returns `BlackjackError::WrongPhase`.
#[proc_macro_attribute]
pub fn allowed_phase(attr: TokenStream1, item: TokenStream1) -> TokenStream1 {
    let mut ast: syn::ImplItemFn = syn::parse(item).unwrap();
    let phases: Vec<String> = attr
        .to_string()
        .split('|')
        .map(|phase| phase.trim().to_string())
        .filter(|phase| !phase.is_empty())
        .collect();
    if phases.is_empty() {
        panic!("allowed_phase needs at least one phase");
    }

    let function_name = ast.sig.ident.to_string();
    let err_msg = format!(
        "{} is only allowed in {} phase",
        function_name,
        phases.join(" or ")
    );
    let pattern = phase_pattern(&phases);
    let early_return = quote! {
        if !matches!(self.current_game_phase, #pattern) {
            return Err(crate::BlackjackError::WrongPhase(String::from(#err_msg)));
        }
    };
    let early_return: syn::Stmt = syn::parse2(early_return).unwrap();
    ast.block.stmts.insert(0, early_return);
    ast.into_token_stream().into()
}

fn phase_pattern(phases: &[String]) -> TokenStream2 {
    let variants = phases.iter().map(|phase| {
        let ident = format_ident!("{}", phase);
        quote! { GamePhase::#ident }
    });
    quote! { #(#variants)|* }
}
