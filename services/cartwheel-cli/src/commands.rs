use anyhow::{Context, Result, bail};
use clap::Subcommand;
use cw_api_types::{
    AddressDraft, CartLine, OrderStatus, ProductId, Session, ShippingMode, UserId, UserSnapshot,
    WishItem,
};
use cw_ledger::{PaymentCard, ShippingDetails, Storefront, normalize_category};
use rust_decimal::Decimal;
use serde_json::{Value, json};

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect and change favorites
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Order history and checkout
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Saved shipping addresses
    Addresses {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Store a session and merge the guest cart and wishlist into it
    SignIn {
        #[arg(long)]
        user_id: String,
        #[arg(long, env = "CARTWHEEL_TOKEN")]
        token: Option<String>,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Drop the session and the account's local cart
    SignOut,
    /// Show the current owner
    Whoami,
    /// Badge counts for cart, wishlist, addresses and orders
    Counters,
    /// Resolve a category name or alias to its slug
    Category { name: String },
}

#[derive(Subcommand)]
pub enum CartAction {
    /// Lines, meta and totals
    Show {
        #[arg(long)]
        express: bool,
    },
    Add {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        image: Option<String>,
    },
    /// Set a line's quantity; zero or less removes it
    Set {
        id: String,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    Remove { id: String },
    Clear,
    /// Replace the local cart with the account's server cart
    Sync,
    Coupon { code: String },
    ClearCoupon,
}

#[derive(Subcommand)]
pub enum WishlistAction {
    List,
    Toggle {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        price: Decimal,
    },
    Remove { id: String },
    Clear,
    Sync,
}

#[derive(Subcommand)]
pub enum OrderAction {
    List {
        /// processing, shipped, delivered or cancelled
        #[arg(long)]
        status: Option<String>,
    },
    /// Validate details, simulate payment and record the order
    Checkout {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        postal_code: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        card_number: String,
        #[arg(long)]
        card_holder: String,
        /// MM/YY
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        cvv: String,
        #[arg(long)]
        express: bool,
    },
    Status { id: String, status: String },
    Cancel { id: String },
    /// Replace local order history with the account's
    Sync,
}

#[derive(Subcommand)]
pub enum AddressAction {
    List,
    Add {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        line1: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        country: String,
        #[arg(long)]
        default: bool,
    },
    Update {
        id: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        line1: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        country: String,
        #[arg(long)]
        default: bool,
    },
    Remove { id: String },
    Default { id: String },
    Sync,
}

fn mode(express: bool) -> ShippingMode {
    if express {
        ShippingMode::Express
    } else {
        ShippingMode::Standard
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    OrderStatus::parse(raw).with_context(|| format!("unknown order status `{raw}`"))
}

pub async fn execute(shop: &Storefront, command: Commands) -> Result<Value> {
    let output = match command {
        Commands::Cart { action } => cart(shop, action).await?,
        Commands::Wishlist { action } => wishlist(shop, action).await?,
        Commands::Orders { action } => orders(shop, action).await?,
        Commands::Addresses { action } => addresses(shop, action).await?,
        Commands::SignIn {
            user_id,
            token,
            email,
            first_name,
            last_name,
        } => {
            let report = shop
                .sign_in(Session {
                    token,
                    user: UserSnapshot {
                        id: UserId(user_id),
                        email,
                        first_name,
                        last_name,
                    },
                })
                .await;
            serde_json::to_value(report)?
        }
        Commands::SignOut => {
            shop.sign_out();
            json!({ "owner": shop.identity().current_owner_id().to_string() })
        }
        Commands::Whoami => json!({
            "owner": shop.identity().current_owner_id().to_string(),
            "user": shop.current_user(),
        }),
        Commands::Counters => serde_json::to_value(shop.counters())?,
        Commands::Category { name } => match normalize_category(&name) {
            Some(category) => json!({ "slug": category.slug() }),
            None => bail!("unknown category `{name}`"),
        },
    };
    Ok(output)
}

async fn cart(shop: &Storefront, action: CartAction) -> Result<Value> {
    let lines = match action {
        CartAction::Show { express } => {
            return Ok(json!({
                "items": shop.cart().items(),
                "meta": shop.cart().meta(),
                "totals": shop.cart().totals(mode(express)),
            }));
        }
        CartAction::Add {
            id,
            name,
            price,
            quantity,
            image,
        } => {
            let line = CartLine::new(id, name, price, quantity).with_image(image.unwrap_or_default());
            shop.add_to_cart(line).await
        }
        CartAction::Set { id, quantity } => shop.set_cart_quantity(&ProductId(id), quantity).await,
        CartAction::Remove { id } => shop.remove_from_cart(&ProductId(id)).await,
        CartAction::Clear => {
            shop.clear_cart().await;
            Vec::new()
        }
        CartAction::Sync => shop.sync_cart_from_server().await,
        CartAction::Coupon { code } => {
            let coupon = shop.cart().apply_coupon(&code)?;
            return Ok(json!({ "coupon": coupon.as_str() }));
        }
        CartAction::ClearCoupon => {
            return Ok(serde_json::to_value(shop.cart().clear_coupon())?);
        }
    };
    Ok(serde_json::to_value(lines)?)
}

async fn wishlist(shop: &Storefront, action: WishlistAction) -> Result<Value> {
    let output = match action {
        WishlistAction::List => serde_json::to_value(shop.wishlist().list())?,
        WishlistAction::Toggle { id, title, price } => {
            let favorite = shop.toggle_favorite(WishItem::new(id, title, price)).await;
            json!({ "favorite": favorite })
        }
        WishlistAction::Remove { id } => {
            json!({ "removed": shop.remove_favorite(&ProductId(id)).await })
        }
        WishlistAction::Clear => {
            shop.clear_favorites().await;
            json!([])
        }
        WishlistAction::Sync => serde_json::to_value(shop.sync_wishlist_from_server().await)?,
    };
    Ok(output)
}

async fn orders(shop: &Storefront, action: OrderAction) -> Result<Value> {
    let output = match action {
        OrderAction::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            serde_json::to_value(shop.orders().list_by_status(status))?
        }
        OrderAction::Checkout {
            first_name,
            last_name,
            address,
            city,
            postal_code,
            phone,
            card_number,
            card_holder,
            expiry,
            cvv,
            express,
        } => {
            let details = ShippingDetails {
                first_name,
                last_name,
                address,
                city,
                postal_code,
                phone,
            };
            let card = PaymentCard {
                number: card_number,
                holder: card_holder,
                expiry,
                cvv,
            };
            serde_json::to_value(shop.checkout(&details, &card, mode(express)).await?)?
        }
        OrderAction::Status { id, status } => {
            let status = parse_status(&status)?;
            serde_json::to_value(shop.update_order_status(&id, status).await?)?
        }
        OrderAction::Cancel { id } => {
            serde_json::to_value(shop.update_order_status(&id, OrderStatus::Cancelled).await?)?
        }
        OrderAction::Sync => serde_json::to_value(shop.sync_orders_from_server().await)?,
    };
    Ok(output)
}

async fn addresses(shop: &Storefront, action: AddressAction) -> Result<Value> {
    let output = match action {
        AddressAction::List => serde_json::to_value(shop.addresses().list())?,
        AddressAction::Add {
            full_name,
            line1,
            city,
            country,
            default,
        } => {
            let draft = AddressDraft {
                full_name,
                line1,
                city,
                country,
                is_default: default,
            };
            serde_json::to_value(shop.add_address(draft).await?)?
        }
        AddressAction::Update {
            id,
            full_name,
            line1,
            city,
            country,
            default,
        } => {
            let draft = AddressDraft {
                full_name,
                line1,
                city,
                country,
                is_default: default,
            };
            serde_json::to_value(shop.update_address(&id, draft).await?)?
        }
        AddressAction::Remove { id } => json!({ "removed": shop.remove_address(&id).await }),
        AddressAction::Default { id } => {
            serde_json::to_value(shop.set_default_address(&id).await?)?
        }
        AddressAction::Sync => serde_json::to_value(shop.sync_addresses_from_server().await)?,
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_backend::InMemoryBackend;
    use cw_ledger::LedgerConfig;
    use cw_storage::{InMemoryStore, LocalStore, StorageScope, TabId};
    use std::sync::Arc;

    fn shop() -> Storefront {
        let tab = TabId::new_random();
        Storefront::new(
            LedgerConfig::default(),
            Arc::new(LocalStore::new(
                Arc::new(InMemoryStore::default()),
                StorageScope::Durable,
                tab.clone(),
            )),
            Arc::new(LocalStore::new(
                Arc::new(InMemoryStore::default()),
                StorageScope::Session,
                tab,
            )),
            Arc::new(InMemoryBackend::default()),
        )
    }

    #[tokio::test]
    async fn cart_commands_report_lines_and_totals() -> Result<()> {
        let shop = shop();
        execute(
            &shop,
            Commands::Cart {
                action: CartAction::Add {
                    id: "p1".to_owned(),
                    name: "Lamp".to_owned(),
                    price: Decimal::from(100),
                    quantity: 2,
                    image: None,
                },
            },
        )
        .await?;
        execute(
            &shop,
            Commands::Cart {
                action: CartAction::Coupon {
                    code: "sale10".to_owned(),
                },
            },
        )
        .await?;

        let shown = execute(
            &shop,
            Commands::Cart {
                action: CartAction::Show { express: false },
            },
        )
        .await?;

        assert_eq!(shown["items"][0]["quantity"], 2);
        assert_eq!(shown["meta"]["couponCode"], "SALE10");
        assert_eq!(shown["totals"]["total"], 188.0);
        Ok(())
    }

    #[tokio::test]
    async fn account_address_is_kept_after_sync() -> Result<()> {
        let shop = shop();
        execute(
            &shop,
            Commands::SignIn {
                user_id: "42".to_owned(),
                token: Some("t".to_owned()),
                email: String::new(),
                first_name: String::new(),
                last_name: String::new(),
            },
        )
        .await?;
        let added = execute(
            &shop,
            Commands::Addresses {
                action: AddressAction::Add {
                    full_name: "Sami Trabelsi".to_owned(),
                    line1: "12 rue de Marseille".to_owned(),
                    city: "Tunis".to_owned(),
                    country: String::new(),
                    default: false,
                },
            },
        )
        .await?;

        let synced = execute(
            &shop,
            Commands::Addresses {
                action: AddressAction::Sync,
            },
        )
        .await?;

        assert_eq!(synced[0]["id"], added["id"]);
        assert_eq!(synced[0]["line1"], "12 rue de Marseille");
        let orders = execute(
            &shop,
            Commands::Orders {
                action: OrderAction::Sync,
            },
        )
        .await?;
        assert_eq!(orders, serde_json::json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_inputs_are_errors() {
        let shop = shop();
        let status = execute(
            &shop,
            Commands::Orders {
                action: OrderAction::List {
                    status: Some("lost".to_owned()),
                },
            },
        )
        .await;
        assert!(status.is_err());

        let category = execute(
            &shop,
            Commands::Category {
                name: "gaming".to_owned(),
            },
        )
        .await;
        assert!(category.is_err());
    }

    #[tokio::test]
    async fn category_aliases_resolve() -> Result<()> {
        let output = execute(
            &shop(),
            Commands::Category {
                name: "Vêtements Homme".to_owned(),
            },
        )
        .await?;
        assert_eq!(output["slug"], "men's clothing");
        Ok(())
    }
}
