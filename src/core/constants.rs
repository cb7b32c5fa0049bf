//! Wire code tables.
//!
//! These values are part of the strap's wire contract and must match the firmware
//! exactly. Packets keep the raw byte; use `TryFrom<u8>` to classify it.

/// Start-of-frame marker.
pub const SOF: u8 = 0xAA;

/// Smallest legal value of the frame length field.
pub const MIN_FRAME_LENGTH: usize = 8;

/// Smallest number of bytes a frame can occupy on the wire.
pub const MIN_FRAME_BYTES: usize = 8;

/// Bytes before the body: SOF, two length bytes and the header CRC8.
pub const HEADER_LEN: usize = 4;

/// Size of the trailing body CRC32.
pub const CRC32_LEN: usize = 4;

/// Sequence number used for every host-originated packet.
pub const DEFAULT_SEQ: u8 = 0;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $value:expr => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            /// Name as used in firmware logs and captures.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Raw wire value.
            pub const fn code(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $(v if v == $value => Ok(Self::$variant),)+
                    other => Err(other),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

wire_enum! {
    /// Purpose of a packet, carried in the first body byte.
    pub enum PacketType {
        Command = 35 => "COMMAND",
        CommandResponse = 36 => "COMMAND_RESPONSE",
        RealtimeData = 40 => "REALTIME_DATA",
        RealtimeRawData = 43 => "REALTIME_RAW_DATA",
        HistoricalData = 47 => "HISTORICAL_DATA",
        Event = 48 => "EVENT",
        Metadata = 49 => "METADATA",
        ConsoleLogs = 50 => "CONSOLE_LOGS",
        RealtimeImuDataStream = 51 => "REALTIME_IMU_DATA_STREAM",
        HistoricalImuDataStream = 52 => "HISTORICAL_IMU_DATA_STREAM",
    }
}

wire_enum! {
    /// `cmd` values of METADATA packets.
    pub enum MetadataType {
        HistoryStart = 1 => "HISTORY_START",
        HistoryEnd = 2 => "HISTORY_END",
        HistoryComplete = 3 => "HISTORY_COMPLETE",
    }
}

wire_enum! {
    /// `cmd` values of EVENT packets.
    pub enum EventNumber {
        Undefined = 0 => "UNDEFINED",
        Error = 1 => "ERROR",
        ConsoleOutput = 2 => "CONSOLE_OUTPUT",
        BatteryLevel = 3 => "BATTERY_LEVEL",
        SystemControl = 4 => "SYSTEM_CONTROL",
        External5vOn = 5 => "EXTERNAL_5V_ON",
        External5vOff = 6 => "EXTERNAL_5V_OFF",
        ChargingOn = 7 => "CHARGING_ON",
        ChargingOff = 8 => "CHARGING_OFF",
        WristOn = 9 => "WRIST_ON",
        WristOff = 10 => "WRIST_OFF",
        BleConnectionUp = 11 => "BLE_CONNECTION_UP",
        BleConnectionDown = 12 => "BLE_CONNECTION_DOWN",
        RtcLost = 13 => "RTC_LOST",
        DoubleTap = 14 => "DOUBLE_TAP",
        Boot = 15 => "BOOT",
        SetRtc = 16 => "SET_RTC",
        TemperatureLevel = 17 => "TEMPERATURE_LEVEL",
        PairingMode = 18 => "PAIRING_MODE",
        SerialHeadConnected = 19 => "SERIAL_HEAD_CONNECTED",
        SerialHeadRemoved = 20 => "SERIAL_HEAD_REMOVED",
        BatteryPackConnected = 21 => "BATTERY_PACK_CONNECTED",
        BatteryPackRemoved = 22 => "BATTERY_PACK_REMOVED",
        BleBonded = 23 => "BLE_BONDED",
        BleHrProfileEnabled = 24 => "BLE_HR_PROFILE_ENABLED",
        BleHrProfileDisabled = 25 => "BLE_HR_PROFILE_DISABLED",
        TrimAllData = 26 => "TRIM_ALL_DATA",
        TrimAllDataEnded = 27 => "TRIM_ALL_DATA_ENDED",
        FlashInitComplete = 28 => "FLASH_INIT_COMPLETE",
        StrapConditionReport = 29 => "STRAP_CONDITION_REPORT",
        BootReport = 30 => "BOOT_REPORT",
        ExitVirginMode = 31 => "EXIT_VIRGIN_MODE",
        CaptouchAutothresholdAction = 32 => "CAPTOUCH_AUTOTHRESHOLD_ACTION",
        BleRealtimeHrOn = 33 => "BLE_REALTIME_HR_ON",
        BleRealtimeHrOff = 34 => "BLE_REALTIME_HR_OFF",
        AccelerometerReset = 35 => "ACCELEROMETER_RESET",
        AfeReset = 36 => "AFE_RESET",
        ShipModeEnabled = 37 => "SHIP_MODE_ENABLED",
        ShipModeDisabled = 38 => "SHIP_MODE_DISABLED",
        ShipModeBoot = 39 => "SHIP_MODE_BOOT",
        Ch1SaturationDetected = 40 => "CH1_SATURATION_DETECTED",
        Ch2SaturationDetected = 41 => "CH2_SATURATION_DETECTED",
        AccelerometerSaturationDetected = 42 => "ACCELEROMETER_SATURATION_DETECTED",
        BleSystemReset = 43 => "BLE_SYSTEM_RESET",
        BleSystemOn = 44 => "BLE_SYSTEM_ON",
        BleSystemInitialized = 45 => "BLE_SYSTEM_INITIALIZED",
        RawDataCollectionOn = 46 => "RAW_DATA_COLLECTION_ON",
        RawDataCollectionOff = 47 => "RAW_DATA_COLLECTION_OFF",
        StrapDrivenAlarmSet = 56 => "STRAP_DRIVEN_ALARM_SET",
        StrapDrivenAlarmExecuted = 57 => "STRAP_DRIVEN_ALARM_EXECUTED",
        AppDrivenAlarmExecuted = 58 => "APP_DRIVEN_ALARM_EXECUTED",
        StrapDrivenAlarmDisabled = 59 => "STRAP_DRIVEN_ALARM_DISABLED",
        HapticsFired = 60 => "HAPTICS_FIRED",
        ExtendedBatteryInformation = 63 => "EXTENDED_BATTERY_INFORMATION",
        HighFreqSyncPrompt = 96 => "HIGH_FREQ_SYNC_PROMPT",
        HighFreqSyncEnabled = 97 => "HIGH_FREQ_SYNC_ENABLED",
        HighFreqSyncDisabled = 98 => "HIGH_FREQ_SYNC_DISABLED",
        HapticsTerminated = 100 => "HAPTICS_TERMINATED",
    }
}

wire_enum! {
    /// `cmd` values of COMMAND and COMMAND_RESPONSE packets.
    pub enum CommandNumber {
        LinkValid = 1 => "LINK_VALID",
        GetMaxProtocolVersion = 2 => "GET_MAX_PROTOCOL_VERSION",
        ToggleRealtimeHr = 3 => "TOGGLE_REALTIME_HR",
        ReportVersionInfo = 7 => "REPORT_VERSION_INFO",
        SetClock = 10 => "SET_CLOCK",
        GetClock = 11 => "GET_CLOCK",
        ToggleGenericHrProfile = 14 => "TOGGLE_GENERIC_HR_PROFILE",
        ToggleR7DataCollection = 16 => "TOGGLE_R7_DATA_COLLECTION",
        RunHapticPatternMaverick = 19 => "RUN_HAPTIC_PATTERN_MAVERICK",
        AbortHistoricalTransmits = 20 => "ABORT_HISTORICAL_TRANSMITS",
        SendHistoricalData = 22 => "SEND_HISTORICAL_DATA",
        HistoricalDataResult = 23 => "HISTORICAL_DATA_RESULT",
        ForceTrim = 25 => "FORCE_TRIM",
        GetBatteryLevel = 26 => "GET_BATTERY_LEVEL",
        RebootStrap = 29 => "REBOOT_STRAP",
        PowerCycleStrap = 32 => "POWER_CYCLE_STRAP",
        SetReadPointer = 33 => "SET_READ_POINTER",
        GetDataRange = 34 => "GET_DATA_RANGE",
        GetHelloHarvard = 35 => "GET_HELLO_HARVARD",
        StartFirmwareLoad = 36 => "START_FIRMWARE_LOAD",
        LoadFirmwareData = 37 => "LOAD_FIRMWARE_DATA",
        ProcessFirmwareImage = 38 => "PROCESS_FIRMWARE_IMAGE",
        SetLedDrive = 39 => "SET_LED_DRIVE",
        GetLedDrive = 40 => "GET_LED_DRIVE",
        SetTiaGain = 41 => "SET_TIA_GAIN",
        GetTiaGain = 42 => "GET_TIA_GAIN",
        SetBiasOffset = 43 => "SET_BIAS_OFFSET",
        GetBiasOffset = 44 => "GET_BIAS_OFFSET",
        EnterBleDfu = 45 => "ENTER_BLE_DFU",
        SetDpType = 52 => "SET_DP_TYPE",
        ForceDpType = 53 => "FORCE_DP_TYPE",
        SendR10R11Realtime = 63 => "SEND_R10_R11_REALTIME",
        SetAlarmTime = 66 => "SET_ALARM_TIME",
        GetAlarmTime = 67 => "GET_ALARM_TIME",
        RunAlarm = 68 => "RUN_ALARM",
        DisableAlarm = 69 => "DISABLE_ALARM",
        GetAdvertisingNameHarvard = 76 => "GET_ADVERTISING_NAME_HARVARD",
        SetAdvertisingNameHarvard = 77 => "SET_ADVERTISING_NAME_HARVARD",
        RunHapticsPattern = 79 => "RUN_HAPTICS_PATTERN",
        GetAllHapticsPattern = 80 => "GET_ALL_HAPTICS_PATTERN",
        StartRawData = 81 => "START_RAW_DATA",
        StopRawData = 82 => "STOP_RAW_DATA",
        VerifyFirmwareImage = 83 => "VERIFY_FIRMWARE_IMAGE",
        GetBodyLocationAndStatus = 84 => "GET_BODY_LOCATION_AND_STATUS",
        EnterHighFreqSync = 96 => "ENTER_HIGH_FREQ_SYNC",
        ExitHighFreqSync = 97 => "EXIT_HIGH_FREQ_SYNC",
        GetExtendedBatteryInfo = 98 => "GET_EXTENDED_BATTERY_INFO",
        ResetFuelGauge = 99 => "RESET_FUEL_GAUGE",
        CalibrateCapsense = 100 => "CALIBRATE_CAPSENSE",
        ToggleImuModeHistorical = 105 => "TOGGLE_IMU_MODE_HISTORICAL",
        ToggleImuMode = 106 => "TOGGLE_IMU_MODE",
        EnableOpticalData = 107 => "ENABLE_OPTICAL_DATA",
        ToggleOpticalMode = 108 => "TOGGLE_OPTICAL_MODE",
        StartDeviceConfigKeyExchange = 115 => "START_DEVICE_CONFIG_KEY_EXCHANGE",
        SendNextDeviceConfig = 116 => "SEND_NEXT_DEVICE_CONFIG",
        StartFfKeyExchange = 117 => "START_FF_KEY_EXCHANGE",
        SendNextFf = 118 => "SEND_NEXT_FF",
        SetDeviceConfigValue = 119 => "SET_DEVICE_CONFIG_VALUE",
        SetFfValue = 120 => "SET_FF_VALUE",
        GetDeviceConfigValue = 121 => "GET_DEVICE_CONFIG_VALUE",
        StopHaptics = 122 => "STOP_HAPTICS",
        SelectWrist = 123 => "SELECT_WRIST",
        ToggleLabradorDataGeneration = 124 => "TOGGLE_LABRADOR_DATA_GENERATION",
        ToggleLabradorRawSave = 125 => "TOGGLE_LABRADOR_RAW_SAVE",
        GetFfValue = 128 => "GET_FF_VALUE",
        SetResearchPacket = 131 => "SET_RESEARCH_PACKET",
        GetResearchPacket = 132 => "GET_RESEARCH_PACKET",
        StartSession = 133 => "START_SESSION",
        SessionResponse = 134 => "SESSION_RESPONSE",
        ToggleLabradorFiltered = 139 => "TOGGLE_LABRADOR_FILTERED",
        SetAdvertisingName = 140 => "SET_ADVERTISING_NAME",
        GetAdvertisingName = 141 => "GET_ADVERTISING_NAME",
        StartFirmwareLoadNew = 142 => "START_FIRMWARE_LOAD_NEW",
        LoadFirmwareDataNew = 143 => "LOAD_FIRMWARE_DATA_NEW",
        ProcessFirmwareImageNew = 144 => "PROCESS_FIRMWARE_IMAGE_NEW",
        GetHello = 145 => "GET_HELLO",
    }
}
