mod record_id;
mod requests;
mod shopping_list;

pub use record_id::{RecordId, LOCAL_PREFIX};
pub(crate) use requests::resolve_id;
pub use requests::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, ItemBatch, ItemChanges, NewItem,
    UpdateItemRequest,
};
pub use shopping_list::{ShoppingItem, ShoppingList, ShoppingListDetail};
