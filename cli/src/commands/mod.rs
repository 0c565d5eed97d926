mod compare;
mod helpers;
mod import;
mod ingredient;
mod menu;
mod pack;
mod recipe;
mod variant;

pub(crate) use compare::cmd_compare;
pub(crate) use helpers::parse_mode;
pub(crate) use import::cmd_price_import;
pub(crate) use ingredient::{
    cmd_distributor_add, cmd_distributor_list, cmd_ingredient_add, cmd_ingredient_list,
};
pub(crate) use menu::{
    cmd_menu_add, cmd_menu_add_packaging, cmd_menu_analyze, cmd_menu_cost, cmd_menu_list,
};
pub(crate) use pack::cmd_pack_parse;
pub(crate) use recipe::{
    cmd_recipe_add_component, cmd_recipe_add_ingredient, cmd_recipe_cost, cmd_recipe_create,
    cmd_recipe_list,
};
pub(crate) use variant::{cmd_price_history, cmd_price_record, cmd_variant_add, cmd_variant_list};
