//! The fourteen persisted entity types.
//!
//! Order matters: import and export walk this list front to back, one
//! transaction per entity.

use super::codec::{EntityDef, Fallback, Field, PrimaryKey, Upsert};

use super::codec::FieldKind::{Bool, EventLog, Integer, Json, Real, Text, Timestamp};

const CURRENCY: &[(&str, &str)] = &[("gold", "gold"), ("silver", "silver"), ("copper", "copper")];

const USER_FIELDS: &[Field] = &[
    Field::column("passwordHash", "password_hash", Text, Fallback::Absent),
    Field::column("email", "email", Text, Fallback::Absent),
    Field::column("currentRoomId", "current_room_id", Text, Fallback::Text("town_square")),
    Field::column("health", "health", Integer, Fallback::Int(100)),
    Field::column("maxHealth", "max_health", Integer, Fallback::Int(100)),
    Field::column("mana", "mana", Integer, Fallback::Int(50)),
    Field::column("maxMana", "max_mana", Integer, Fallback::Int(50)),
    Field::column("level", "level", Integer, Fallback::Int(1)),
    Field::column("experience", "experience", Integer, Fallback::Int(0)),
    Field::split("currency", CURRENCY),
    Field::column("inventory", "inventory", Json, Fallback::EmptyList),
    Field::column("equipment", "equipment", Json, Fallback::EmptyObject),
    Field::column("flags", "flags", Json, Fallback::EmptyObject),
    Field::column("inCombat", "in_combat", Bool, Fallback::Bool(false)),
    Field::column("isResting", "is_resting", Bool, Fallback::Bool(false)),
    Field::column("isAdmin", "is_admin", Bool, Fallback::Bool(false)),
    Field::column("combatTarget", "combat_target", Text, Fallback::Absent),
    Field::column("createdAt", "created_at", Timestamp, Fallback::Absent),
    Field::column("lastLogin", "last_login", Timestamp, Fallback::Absent),
];

const ROOM_FIELDS: &[Field] = &[
    Field::column("name", "name", Text, Fallback::Text("")),
    Field::column("description", "description", Text, Fallback::Text("")),
    Field::column("areaId", "area_id", Text, Fallback::Absent),
    Field::column("exits", "exits", Json, Fallback::EmptyList),
    Field::column("npcTemplateIds", "npc_template_ids", Json, Fallback::EmptyList),
    Field::column("itemInstances", "item_instances", Json, Fallback::EmptyList),
    Field::split("currency", CURRENCY),
    Field::column("isSafe", "is_safe", Bool, Fallback::Bool(false)),
    Field::column("mapX", "map_x", Integer, Fallback::Int(0)),
    Field::column("mapY", "map_y", Integer, Fallback::Int(0)),
    Field::column("mapZ", "map_z", Integer, Fallback::Int(0)),
];

const NPC_TEMPLATE_FIELDS: &[Field] = &[
    Field::column("name", "name", Text, Fallback::Text("")),
    Field::column("description", "description", Text, Fallback::Text("")),
    Field::column("level", "level", Integer, Fallback::Int(1)),
    Field::column("health", "health", Integer, Fallback::Int(100)),
    Field::column("maxHealth", "max_health", Integer, Fallback::Int(100)),
    Field::range("damage", "damage_min", "damage_max", 1, 4),
    Field::column("armor", "armor", Integer, Fallback::Int(0)),
    Field::column("experienceReward", "experience_reward", Integer, Fallback::Int(10)),
    Field::column("aggressive", "aggressive", Bool, Fallback::Bool(false)),
    // Nullable: an NPC that never declared merchant status is not "not a merchant".
    Field::column("merchant", "merchant", Bool, Fallback::Absent),
    Field::column("respawnSeconds", "respawn_seconds", Integer, Fallback::Int(300)),
    Field::column("dialogue", "dialogue", Json, Fallback::EmptyObject),
    Field::column("lootTable", "loot_table", Json, Fallback::EmptyList),
];

const ITEM_TEMPLATE_FIELDS: &[Field] = &[
    Field::column("name", "name", Text, Fallback::Text("")),
    Field::column("description", "description", Text, Fallback::Text("")),
    Field::column("type", "type", Text, Fallback::Text("misc")),
    Field::column("slot", "slot", Text, Fallback::Absent),
    Field::column("weight", "weight", Real, Fallback::Real(0.0)),
    Field::column("value", "value", Integer, Fallback::Int(0)),
    Field::column("stackable", "stackable", Bool, Fallback::Bool(false)),
    Field::column("maxStack", "max_stack", Integer, Fallback::Int(1)),
    Field::column("stats", "stats", Json, Fallback::EmptyObject),
    Field::column("requirements", "requirements", Json, Fallback::EmptyObject),
];

const ITEM_INSTANCE_FIELDS: &[Field] = &[
    Field::column("templateId", "template_id", Text, Fallback::Absent),
    Field::column("ownerId", "owner_id", Text, Fallback::Absent),
    Field::column("quantity", "quantity", Integer, Fallback::Int(1)),
    Field::column("durability", "durability", Integer, Fallback::Int(100)),
    Field::column("customName", "custom_name", Text, Fallback::Absent),
    Field::column("createdAt", "created_at", Timestamp, Fallback::Absent),
    Field::column("history", "history", EventLog, Fallback::EmptyList),
    Field::column("properties", "properties", Json, Fallback::EmptyObject),
];

const AREA_FIELDS: &[Field] = &[
    Field::column("name", "name", Text, Fallback::Text("")),
    Field::column("description", "description", Text, Fallback::Text("")),
    Field::column("minLevel", "min_level", Integer, Fallback::Int(1)),
    Field::column("maxLevel", "max_level", Integer, Fallback::Int(10)),
    Field::column("roomIds", "room_ids", Json, Fallback::EmptyList),
    Field::column("spawnConfig", "spawn_config", Json, Fallback::EmptyList),
];

const ABILITY_FIELDS: &[Field] = &[
    Field::column("name", "name", Text, Fallback::Text("")),
    Field::column("description", "description", Text, Fallback::Text("")),
    Field::column("type", "type", Text, Fallback::Text("skill")),
    Field::column("manaCost", "mana_cost", Integer, Fallback::Int(0)),
    Field::column("cooldownSeconds", "cooldown_seconds", Integer, Fallback::Int(0)),
    Field::column("levelRequired", "level_required", Integer, Fallback::Int(1)),
    Field::column("power", "power", Integer, Fallback::Int(0)),
    Field::column("targetType", "target_type", Text, Fallback::Text("enemy")),
    Field::column("passive", "passive", Bool, Fallback::Bool(false)),
    Field::column("effects", "effects", Json, Fallback::EmptyList),
];

const ROOM_STATE_FIELDS: &[Field] = &[
    Field::column("items", "items", Json, Fallback::EmptyList),
    Field::column("npcs", "npcs", Json, Fallback::EmptyList),
    Field::split("currency", CURRENCY),
    Field::column("lastUpdated", "last_updated", Timestamp, Fallback::Absent),
];

const MERCHANT_STATE_FIELDS: &[Field] = &[
    Field::column("roomId", "room_id", Text, Fallback::Absent),
    Field::column("inventory", "inventory", Json, Fallback::EmptyList),
    Field::split("currency", CURRENCY),
    Field::column("lastRestock", "last_restock", Timestamp, Fallback::Absent),
];

const ADMIN_FIELDS: &[Field] = &[
    Field::column("role", "role", Text, Fallback::Text("admin")),
    Field::column("addedBy", "added_by", Text, Fallback::Absent),
    Field::column("addedAt", "added_at", Timestamp, Fallback::Absent),
    Field::column("permissions", "permissions", Json, Fallback::EmptyList),
];

const BUG_REPORT_FIELDS: &[Field] = &[
    Field::column("reporter", "reporter", Text, Fallback::Text("unknown")),
    Field::column("description", "description", Text, Fallback::Text("")),
    Field::column("roomId", "room_id", Text, Fallback::Absent),
    Field::column("status", "status", Text, Fallback::Text("open")),
    Field::column("resolved", "resolved", Bool, Fallback::Bool(false)),
    Field::column("resolvedBy", "resolved_by", Text, Fallback::Absent),
    Field::column("adminNotes", "admin_notes", Text, Fallback::Absent),
    Field::column("createdAt", "created_at", Timestamp, Fallback::Absent),
    Field::column("resolvedAt", "resolved_at", Timestamp, Fallback::Absent),
];

const SNAKE_SCORE_FIELDS: &[Field] = &[
    Field::column("score", "score", Integer, Fallback::Int(0)),
    Field::column("achievedAt", "achieved_at", Timestamp, Fallback::Absent),
];

const MUD_CONFIG_FIELDS: &[Field] = &[
    Field::column("name", "name", Text, Fallback::Text("MUD")),
    Field::column("welcomeMessage", "welcome_message", Text, Fallback::Text("")),
    Field::column("motd", "motd", Text, Fallback::Text("")),
    Field::column("maxPlayers", "max_players", Integer, Fallback::Int(50)),
    Field::column("startingRoomId", "starting_room_id", Text, Fallback::Text("town_square")),
    Field::column("pvpEnabled", "pvp_enabled", Bool, Fallback::Bool(false)),
    Field::column("experienceMultiplier", "experience_multiplier", Real, Fallback::Real(1.0)),
    Field::column("settings", "settings", Json, Fallback::EmptyObject),
];

const GAME_TIMER_CONFIG_FIELDS: &[Field] = &[
    Field::column("tickIntervalMs", "tick_interval_ms", Integer, Fallback::Int(1000)),
    Field::column("combatRoundMs", "combat_round_ms", Integer, Fallback::Int(3000)),
    Field::column("regenIntervalMs", "regen_interval_ms", Integer, Fallback::Int(10_000)),
    Field::column("autosaveIntervalMs", "autosave_interval_ms", Integer, Fallback::Int(60_000)),
    Field::column("respawnIntervalMs", "respawn_interval_ms", Integer, Fallback::Int(300_000)),
    Field::column("enabled", "enabled", Bool, Fallback::Bool(true)),
];

pub static ENTITIES: [EntityDef; 14] = [
    EntityDef {
        name: "User",
        collection: "users",
        primary_key: PrimaryKey::Field { key: "username", column: "username" },
        fields: USER_FIELDS,
        upsert: Upsert::Columns(&[
            "current_room_id",
            "health",
            "max_health",
            "mana",
            "max_mana",
            "level",
            "experience",
            "gold",
            "silver",
            "copper",
            "inventory",
            "equipment",
            "flags",
            "in_combat",
            "is_resting",
            "last_login",
        ]),
    },
    EntityDef {
        name: "Room",
        collection: "rooms",
        primary_key: PrimaryKey::Field { key: "id", column: "id" },
        fields: ROOM_FIELDS,
        upsert: Upsert::Columns(&[
            "name",
            "description",
            "area_id",
            "exits",
            "npc_template_ids",
            "item_instances",
            "gold",
            "silver",
            "copper",
            "is_safe",
        ]),
    },
    EntityDef {
        name: "NpcTemplate",
        collection: "npc_templates",
        primary_key: PrimaryKey::Field { key: "id", column: "id" },
        fields: NPC_TEMPLATE_FIELDS,
        upsert: Upsert::Columns(&[
            "name",
            "description",
            "level",
            "health",
            "max_health",
            "damage_min",
            "damage_max",
            "armor",
            "experience_reward",
            "aggressive",
            "merchant",
        ]),
    },
    EntityDef {
        name: "ItemTemplate",
        collection: "item_templates",
        primary_key: PrimaryKey::Field { key: "id", column: "id" },
        fields: ITEM_TEMPLATE_FIELDS,
        upsert: Upsert::Columns(&[
            "name",
            "description",
            "type",
            "slot",
            "weight",
            "value",
            "stats",
            "requirements",
        ]),
    },
    EntityDef {
        name: "ItemInstance",
        collection: "item_instances",
        primary_key: PrimaryKey::Field { key: "instanceId", column: "instance_id" },
        fields: ITEM_INSTANCE_FIELDS,
        upsert: Upsert::Columns(&[
            "owner_id",
            "quantity",
            "durability",
            "custom_name",
            "history",
            "properties",
        ]),
    },
    EntityDef {
        name: "Area",
        collection: "areas",
        primary_key: PrimaryKey::Field { key: "id", column: "id" },
        fields: AREA_FIELDS,
        upsert: Upsert::Columns(&[
            "name",
            "description",
            "min_level",
            "max_level",
            "room_ids",
            "spawn_config",
        ]),
    },
    EntityDef {
        name: "Ability",
        collection: "abilities",
        primary_key: PrimaryKey::Field { key: "id", column: "id" },
        fields: ABILITY_FIELDS,
        upsert: Upsert::All,
    },
    EntityDef {
        name: "RoomState",
        collection: "room_states",
        primary_key: PrimaryKey::Field { key: "roomId", column: "room_id" },
        fields: ROOM_STATE_FIELDS,
        upsert: Upsert::All,
    },
    EntityDef {
        name: "MerchantState",
        collection: "merchant_states",
        primary_key: PrimaryKey::Field { key: "npcTemplateId", column: "npc_template_id" },
        fields: MERCHANT_STATE_FIELDS,
        upsert: Upsert::Columns(&["inventory", "gold", "silver", "copper", "last_restock"]),
    },
    EntityDef {
        name: "Admin",
        collection: "admins",
        primary_key: PrimaryKey::Field { key: "username", column: "username" },
        fields: ADMIN_FIELDS,
        upsert: Upsert::Columns(&["role", "permissions"]),
    },
    EntityDef {
        name: "BugReport",
        collection: "bug_reports",
        primary_key: PrimaryKey::Field { key: "id", column: "id" },
        fields: BUG_REPORT_FIELDS,
        upsert: Upsert::Columns(&[
            "status",
            "resolved",
            "resolved_by",
            "admin_notes",
            "resolved_at",
        ]),
    },
    EntityDef {
        name: "SnakeScore",
        collection: "snake_scores",
        primary_key: PrimaryKey::Field { key: "username", column: "username" },
        fields: SNAKE_SCORE_FIELDS,
        upsert: Upsert::Columns(&["score", "achieved_at"]),
    },
    EntityDef {
        name: "MudConfig",
        collection: "mud_config",
        primary_key: PrimaryKey::Singleton,
        fields: MUD_CONFIG_FIELDS,
        upsert: Upsert::All,
    },
    EntityDef {
        name: "GameTimerConfig",
        collection: "game_timer_config",
        primary_key: PrimaryKey::Singleton,
        fields: GAME_TIMER_CONFIG_FIELDS,
        upsert: Upsert::All,
    },
];
