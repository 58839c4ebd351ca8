/// Lets handlers extract individual `AppState` fields, e.g.
/// `State(query): State<QueryLayer>`.
///
/// ```ignore
/// state_fields! {
///     query: QueryLayer,
///     config: Arc<ApiConfig>,
/// }
/// ```
macro_rules! state_fields {
    ($($field:ident: $type:ty),+ $(,)?) => {
        $(
            impl axum::extract::FromRef<$crate::state::AppState> for $type {
                fn from_ref(state: &$crate::state::AppState) -> Self {
                    state.$field.clone()
                }
            }
        )+
    };
}
